use anyhow::{bail, Result};
use vpn_conf::verify::{build_verify_report, render_verify_text};

use crate::cli::{GlobalArgs, OutputFormat, VerifyArgs};
use crate::session::Session;

pub fn run_verify(global: &GlobalArgs, args: VerifyArgs) -> Result<()> {
    let session = Session::open(global)?;
    let report = build_verify_report(&session.store, &session.warnings);

    match args.format {
        OutputFormat::Text => println!("{}", render_verify_text(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if report.errors > 0 {
        bail!("verify failed: {} errors", report.errors);
    }
    if args.strict && report.warnings > 0 {
        bail!("verify failed in strict mode: {} warnings", report.warnings);
    }
    Ok(())
}
