//! Printable slip output.
//!
//! Slips are written as self-printing HTML under `<data_dir>/slips/` and
//! handed to the system browser, which raises the print dialog once the page
//! has loaded. There is no printer-driver integration.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::slips::{self, SlipDocument, SlipOptions};

const SLIPS_DIR: &str = "slips";

/// Where a printed slip ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintOutcome {
    pub path: PathBuf,
    pub opened: bool,
}

fn write_slip_html_file(data_dir: &Path, stem: &str, html: &str) -> Result<PathBuf, String> {
    let slips_dir = data_dir.join(SLIPS_DIR);
    fs::create_dir_all(&slips_dir).map_err(|e| format!("create slips dir: {e}"))?;
    let file_path = slips_dir.join(format!("{stem}.html"));
    fs::write(&file_path, html).map_err(|e| format!("write slip file: {e}"))?;
    Ok(file_path)
}

/// Render `document` to HTML, write it, and open it unless `open` is false.
///
/// Failing to launch a browser is not an error; the file path is still
/// returned so the operator can open it by hand.
pub fn print_slip(
    document: &SlipDocument,
    cfg: &SlipOptions,
    data_dir: &Path,
    open: bool,
) -> Result<PrintOutcome, String> {
    let html = slips::render_html(document, cfg);
    let path = write_slip_html_file(data_dir, &slips::slip_file_stem(document), &html)?;
    info!(path = %path.display(), "slip file generated");

    let opened = open
        && match webbrowser::open(&path.to_string_lossy()) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to open slip in browser");
                false
            }
        };
    Ok(PrintOutcome { path, opened })
}
