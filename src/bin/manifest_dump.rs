//! Print the edits recorded in a manifest file.
//!
//! ```text
//! $ manifest-dump data/MANIFEST-000001
//! #1 SetNextFileNumber 2
//! #2 AddFile level=0 file=1 size=4172 smallest=apple largest=pear key=<32 bytes>
//! (2 records)
//! ```
//!
//! Set `RUST_LOG=debug` for diagnostics on stderr.

use anyhow::{bail, Context, Result};
use std::io::{self, Write};

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: manifest-dump <MANIFEST>");
    };
    if args.next().is_some() {
        bail!("usage: manifest-dump <MANIFEST>");
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let count = sealtable::manifest::dump_manifest(&path, &mut out)
        .with_context(|| format!("failed to dump manifest {}", path))?;
    writeln!(out, "({} records)", count)?;
    Ok(())
}
