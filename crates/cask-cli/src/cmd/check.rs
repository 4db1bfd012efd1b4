use cask_core::check;
use cask_core::config::CaskConfig;

use super::{open_repo, resolve_reference, CmdResult};

pub(crate) fn run_check(cfg: &CaskConfig, snapshot: Option<&str>, fast: bool) -> CmdResult {
    let repo = open_repo(cfg)?;
    let report = match snapshot {
        Some(reference) => {
            let (id, _) = resolve_reference(&repo, reference)?;
            check::run(&repo, &id, fast)?
        }
        None => check::run_all(&repo, fast)?,
    };

    if !report.errors.is_empty() {
        println!("Errors found:");
        for err in &report.errors {
            println!("  [{}] {}", err.context, err.message);
        }
        println!();
    }
    println!(
        "Check complete: {} snapshots, {} entries, {} objects, {} chunks ({} read back), {} packfiles verified, {} errors",
        report.snapshots_checked,
        report.entries_checked,
        report.objects_checked,
        report.chunks_checked,
        report.chunks_verified,
        report.packfiles_verified,
        report.errors.len()
    );
    if !report.is_ok() {
        return Err(format!("check found {} errors", report.errors.len()).into());
    }
    Ok(())
}
