//! MuseScore command line as conversion collaborator.
//!
//! Exports the `.wd` artifact set (metadata, SVG pages, OGG audio, measure and
//! segment positions) for the `export` subcommand, and backs direct-file score
//! sources with a session living in a temporary directory.

use super::convert::{ConversionSession, ScoreConverter};
use crate::error::{Result, ScoreError};
use regex::Regex;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Handle on the `mscore` executable.
#[derive(Debug, Clone)]
pub struct Mscore {
    program: PathBuf,
}

impl Mscore {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Uses `$MSCORE` when set, `mscore` from `PATH` otherwise.
    pub fn from_env() -> Self {
        Self::new(std::env::var_os("MSCORE").unwrap_or_else(|| "mscore".into()))
    }

    fn run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| ScoreError::Conversion(format!("cannot run {:?}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(ScoreError::Conversion(format!(
                "{:?} exited with {}",
                self.program, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// `(major, minor, patch)` of the installed MuseScore.
    pub fn version(&self) -> Result<(u32, u32, u32)> {
        let text = self.run(["--version"])?;
        parse_version(&text)
            .ok_or_else(|| ScoreError::Conversion("MuseScore not found or unknown version".to_string()))
    }

    fn export_to(&self, dest: &Path, score: &Path) -> Result<()> {
        self.run([OsStr::new("--export-to"), dest.as_os_str(), score.as_os_str()])
            .map(|_| ())
    }

    /// Writes `meta.metajson` into `dir`.
    pub fn export_metadata(&self, score: &Path, dir: &Path) -> Result<()> {
        let dest = dir.join("meta.metajson");
        let (major, _, _) = self.version()?;
        if major == 3 {
            self.export_to(&dest, score)
        } else {
            let meta = self.run([OsStr::new("--score-meta"), score.as_os_str()])?;
            fs::write(&dest, meta).map_err(|e| ScoreError::io(&dest, e))
        }
    }

    /// Writes `graphic-<n>.svg` pages into `dir` and returns them in page order.
    pub fn export_graphics(&self, score: &Path, dir: &Path) -> Result<Vec<PathBuf>> {
        self.export_to(&dir.join("graphic.svg"), score)?;
        let mut pages = list_numbered(dir, "graphic-", ".svg")?;
        pages.sort_by_key(|(n, _)| *n);
        Ok(pages.into_iter().map(|(_, path)| path).collect())
    }

    /// Writes `measures.mpos` and `segments.spos` into `dir`.
    pub fn export_positions(&self, score: &Path, dir: &Path) -> Result<()> {
        self.export_to(&dir.join("measures.mpos"), score)?;
        self.export_to(&dir.join("segments.spos"), score)
    }

    /// Writes `audio.ogg` plus one `audio-<part>.ogg` per part through a job file.
    pub fn export_audio(&self, score: &Path, dir: &Path) -> Result<Vec<PathBuf>> {
        let job = serde_json::json!([{
            "in": score.display().to_string(),
            "out": [
                dir.join("audio.ogg").display().to_string(),
                [format!("{}/audio-", dir.display()), ".ogg"],
            ],
        }]);

        let job_file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .map_err(|e| ScoreError::io(std::env::temp_dir(), e))?;
        fs::write(job_file.path(), job.to_string()).map_err(|e| ScoreError::io(job_file.path(), e))?;
        self.run([OsStr::new("--job"), job_file.path().as_os_str()])?;

        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| ScoreError::io(dir, e))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("audio") && n.ends_with(".ogg"))
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

/// Parses `MuseScore4 4.2.1`-style version banners; major version must match.
pub fn parse_version(text: &str) -> Option<(u32, u32, u32)> {
    let pattern = Regex::new(r"MuseScore([34]) ([34])\.([0-9]+)\.([0-9]+)").ok()?;
    let caps = pattern.captures(text)?;
    if caps[1] != caps[2] {
        return None;
    }
    Some((
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
        caps[4].parse().ok()?,
    ))
}

fn list_numbered(dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<(usize, PathBuf)>> {
    let entries = fs::read_dir(dir).map_err(|e| ScoreError::io(dir, e))?;
    Ok(entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let n = name.strip_prefix(prefix)?.strip_suffix(suffix)?.parse().ok()?;
            Some((n, path))
        })
        .collect())
}

/// Exports a complete `.wd` directory for a `.mscz` score.
pub fn export_wd(mscore: &Mscore, score: &Path, output: &Path) -> Result<()> {
    if !score.is_file() {
        return Err(ScoreError::Conversion(format!("Cannot find file {}", score.display())));
    }
    if score.extension().and_then(|e| e.to_str()) != Some("mscz") {
        return Err(ScoreError::Conversion("Score file must have .mscz extension".to_string()));
    }
    if output.is_file() {
        return Err(ScoreError::Conversion(format!("{} is an existing file", output.display())));
    }
    if output.exists() {
        fs::remove_dir_all(output).map_err(|e| ScoreError::io(output, e))?;
    }
    fs::create_dir_all(output).map_err(|e| ScoreError::io(output, e))?;

    log::info!("EXPORT: Generating metadata");
    mscore.export_metadata(score, output)?;
    mscore.export_positions(score, output)?;

    log::info!("EXPORT: Generating SVG graphics");
    let pages = mscore.export_graphics(score, output)?;
    log::info!("EXPORT: {} pages", pages.len());

    log::info!("EXPORT: Generating OGG audio");
    let audio = mscore.export_audio(score, output)?;
    log::info!("EXPORT: {} audio files", audio.len());

    Ok(())
}

/// Conversion collaborator backed by the MuseScore CLI.
pub struct MscoreConverter {
    mscore: Mscore,
}

impl MscoreConverter {
    pub fn new(mscore: Mscore) -> Self {
        Self { mscore }
    }
}

impl ScoreConverter for MscoreConverter {
    fn open(&self, file_name: &str, bytes: Vec<u8>) -> Result<Box<dyn ConversionSession>> {
        let dir = tempfile::tempdir().map_err(|e| ScoreError::io(std::env::temp_dir(), e))?;
        let score = dir.path().join(file_name);
        fs::write(&score, bytes).map_err(|e| ScoreError::io(&score, e))?;

        Ok(Box::new(MscoreSession {
            mscore: self.mscore.clone(),
            dir,
            score,
            metadata_done: false,
            graphics: None,
            positions_done: false,
        }))
    }
}

/// Artifacts are exported on first request and served from the session directory.
struct MscoreSession {
    mscore: Mscore,
    dir: tempfile::TempDir,
    score: PathBuf,
    metadata_done: bool,
    graphics: Option<Vec<PathBuf>>,
    positions_done: bool,
}

impl MscoreSession {
    fn read_text(&self, name: &str) -> Result<String> {
        let path = self.dir.path().join(name);
        fs::read_to_string(&path).map_err(|e| ScoreError::io(&path, e))
    }
}

impl ConversionSession for MscoreSession {
    fn metadata(&mut self) -> Result<String> {
        if !self.metadata_done {
            self.mscore.export_metadata(&self.score, self.dir.path())?;
            self.metadata_done = true;
        }
        self.read_text("meta.metajson")
    }

    fn graphic(&mut self, page: usize) -> Result<Vec<u8>> {
        if self.graphics.is_none() {
            self.graphics = Some(self.mscore.export_graphics(&self.score, self.dir.path())?);
        }
        let pages = self.graphics.as_deref().unwrap_or_default();
        let path = pages.get(page).ok_or(ScoreError::PageOutOfRange {
            index: page,
            count: pages.len(),
        })?;
        fs::read(path).map_err(|e| ScoreError::io(path, e))
    }

    fn positions(&mut self) -> Result<String> {
        if !self.positions_done {
            self.mscore.export_positions(&self.score, self.dir.path())?;
            self.positions_done = true;
        }
        self.read_text("measures.mpos")
    }
}
