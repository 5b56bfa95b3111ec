//! Persisting the tuning results of a finished sweep.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use agtune_kernels::ProfilingContext;
use tracing::info;

use crate::error::{HarnessError, Result};

/// Base name shared by the artifacts of one run.
pub fn artifact_name(arch: u32, world_size: usize, nnodes: usize) -> String {
    format!("config_ag_gemm_kernel_sm{arch}_tp{world_size}_nnodes{nnodes}")
}

/// Where the results of a run go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// `<name>.cu` and `<name>.prof.log` inside an existing directory.
    Directory(PathBuf),
    /// Both sections printed to standard output.
    Stdout,
}

impl Destination {
    /// A directory destination when `dir` is given; it must already exist.
    pub fn from_option(dir: Option<PathBuf>) -> Result<Self> {
        match dir {
            Some(dir) if dir.is_dir() => Ok(Self::Directory(dir)),
            Some(dir) => Err(HarnessError::MissingOutputDir(dir)),
            None => Ok(Self::Stdout),
        }
    }
}

/// Paths of the files written by [`write_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub code: PathBuf,
    pub log: PathBuf,
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> HarnessError + '_ {
    move |source| HarnessError::Io { path: path.to_path_buf(), source }
}

fn write_records<W: Write + ?Sized>(ctx: &ProfilingContext, out: &mut W) -> io::Result<()> {
    for record in ctx.get_all_prof_results() {
        writeln!(out, "{record}")?;
    }
    Ok(())
}

/// Write the generated source and the timing log into `dir`, named after
/// the context.
pub fn write_files(ctx: &ProfilingContext, dir: &Path) -> Result<Artifacts> {
    let code = dir.join(format!("{}.cu", ctx.name()));
    let log = dir.join(format!("{}.prof.log", ctx.name()));

    fs::write(&code, format!("{}\n", ctx.get_code())).map_err(io_err(&code))?;

    let mut records = Vec::new();
    write_records(ctx, &mut records).map_err(io_err(&log))?;
    fs::write(&log, records).map_err(io_err(&log))?;

    info!(
        code = %code.display(),
        log = %log.display(),
        records = ctx.get_all_prof_results().len(),
        "wrote tuning artifacts"
    );
    Ok(Artifacts { code, log })
}

/// Print the generated source and every timing record to `out`, with the
/// same text the files would hold.
pub fn write_console<W: Write + ?Sized>(ctx: &ProfilingContext, out: &mut W) -> io::Result<()> {
    writeln!(out, "Generated Code:")?;
    writeln!(out, "{}", ctx.get_code())?;
    writeln!(out)?;
    writeln!(out, "Profiling Results:")?;
    write_records(ctx, out)?;
    out.flush()
}

/// Emit to `destination`; console output goes to `stdout`.
///
/// A directory destination is checked again here, since it may have gone
/// away while the sweep ran.
pub fn emit<W: Write + ?Sized>(
    ctx: &ProfilingContext,
    destination: &Destination,
    stdout: &mut W,
) -> Result<Option<Artifacts>> {
    match destination {
        Destination::Directory(dir) if !dir.is_dir() => {
            Err(HarnessError::MissingOutputDir(dir.clone()))
        }
        Destination::Directory(dir) => write_files(ctx, dir).map(Some),
        Destination::Stdout => {
            write_console(ctx, stdout).map_err(io_err(Path::new("<stdout>")))?;
            Ok(None)
        }
    }
}
