//! `neutron-pack clean` command

use anyhow::Result;

use crate::cli::CleanArgs;
use neutron_pack::core::platform::HostPlatform;
use neutron_pack::ops::{clean, CleanOptions};
use neutron_pack::util::shell::{Shell, Status};
use neutron_pack::util::GlobalContext;

pub fn execute(_args: CleanArgs, shell: &Shell) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let host = HostPlatform::detect()?;

    let report = clean(&ctx, shell, &CleanOptions::for_host(host.os))?;

    shell.status(
        Status::Finished,
        format!(
            "removed {} director(ies) and {} file(s)",
            report.removed_dirs.len(),
            report.removed_files.len()
        ),
    );
    if !report.failed.is_empty() {
        shell.warn(format!(
            "{} path(s) could not be removed; close programs using them and retry",
            report.failed.len()
        ));
    }
    shell.json_event(&serde_json::json!({
        "reason": "clean-finished",
        "report": report,
    }));

    Ok(())
}
