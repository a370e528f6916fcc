// The `asure` command line front end: a thin `structopt` wrapper around
// the library's `scan`/`update`/`check`/`signoff`/`show`/`walk` entry
// points.

use std::io::{self, Write};
use std::process;

use structopt::StructOpt;

use asure::{log_init, Surefile};

#[derive(StructOpt)]
#[structopt(name = "asure", about = "Directory tree integrity checker")]
struct Opt {
    /// Base of the surefile name (default "2sure"); `.dat.gz`/`.bak.gz`/
    /// `.0.gz` are appended as appropriate.
    #[structopt(short = "f", long = "file", default_value = "2sure")]
    file: String,

    /// Directory to scan, defaults to "."
    #[structopt(short = "d", long = "dir", default_value = ".")]
    dir: String,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Scan a directory for the first time, writing a fresh surefile.
    #[structopt(name = "scan")]
    Scan,
    /// Walk the directory, hoisting hashes from the existing surefile,
    /// and write the result as the new surefile.
    #[structopt(name = "update")]
    Update,
    /// Compare the directory against the current surefile.
    #[structopt(name = "check")]
    Check,
    /// Compare the previous surefile against the current one.
    #[structopt(name = "signoff")]
    Signoff,
    /// Print the contents of the current surefile.
    #[structopt(name = "show")]
    Show,
    /// Walk the directory and print what a scan would record, without
    /// touching any surefile.
    #[structopt(name = "walk")]
    Walk,
}

fn main() {
    log_init();

    let opt = Opt::from_args();
    if let Err(e) = run(&opt) {
        eprintln!("asure: {}", e);
        process::exit(1);
    }
}

fn run(opt: &Opt) -> asure::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match opt.command {
        Command::Scan => {
            let sure = Surefile::new(&opt.file)?;
            asure::scan(&opt.dir, &sure)
        }
        Command::Update => {
            let sure = Surefile::new(&opt.file)?;
            asure::update(&opt.dir, &sure)
        }
        Command::Check => {
            let sure = Surefile::new(&opt.file)?;
            let had_diffs = check_reports_diffs(&opt.dir, &sure, &mut out)?;
            out.flush().map_err(|e| asure::Error::io("write", "<stdout>", e))?;
            if had_diffs {
                process::exit(1);
            }
            Ok(())
        }
        Command::Signoff => {
            let sure = Surefile::new(&opt.file)?;
            asure::signoff(&sure, &mut out)
        }
        Command::Show => {
            let sure = Surefile::new(&opt.file)?;
            asure::show(&sure, &mut out)
        }
        Command::Walk => asure::walk(&opt.dir, &mut out),
    }
}

/// Run `check`, reporting whether it produced any diff output, so the
/// process can exit non-zero when the tree has drifted from the
/// surefile.
fn check_reports_diffs<W: Write>(
    dir: &str,
    sure: &Surefile,
    out: &mut W,
) -> asure::Result<bool> {
    let mut buf = Vec::new();
    asure::check(dir, sure, &mut buf)?;
    let had_diffs = !buf.is_empty();
    out.write_all(&buf)
        .map_err(|e| asure::Error::io("write", "<stdout>", e))?;
    Ok(had_diffs)
}
