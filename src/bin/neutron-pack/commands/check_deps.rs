//! `neutron-pack check-deps` command

use anyhow::{bail, Result};

use crate::cli::CheckDepsArgs;
use neutron_pack::core::platform::HostPlatform;
use neutron_pack::ops::{check_dependencies, format_report, HostFacts};
use neutron_pack::util::process::SystemRunner;
use neutron_pack::util::Shell;

pub fn execute(_args: CheckDepsArgs, shell: &Shell) -> Result<()> {
    let host = HostPlatform::detect()?;
    let report = check_dependencies(&SystemRunner, &host, &HostFacts::system());

    if shell.is_json() {
        shell.json_event(&serde_json::to_value(&report)?);
    } else {
        print!(
            "{}",
            format_report("Neutron build dependencies", &report, shell.is_verbose())
        );
    }

    if !report.all_required_passed() {
        bail!(
            "{} required dependenc(ies) missing",
            report.required_failed_count()
        );
    }
    Ok(())
}
