//! Paginated asset loading: score repositories, conversion, the page
//! scheduler and the generation-guarded orchestrator.

pub mod convert;
pub mod mscore;
pub mod pages;
pub mod score;
pub mod source;
pub mod token;

pub use convert::{ConversionSession, ConversionSource, ScoreConverter};
pub use mscore::{Mscore, MscoreConverter, export_wd};
pub use pages::{Completion, PageScheduler};
pub use score::{LoaderUpdate, ScoreLoader};
pub use source::{DefaultRepositoryFactory, DirectorySource, LoadFuture, RepositoryFactory, ScoreRepository};
pub use token::{Generation, LoadToken};
