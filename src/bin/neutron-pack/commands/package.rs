//! `neutron-pack package` command

use std::time::Instant;

use anyhow::Result;

use crate::cli::PackageArgs;
use neutron_pack::core::target::Profile;
use neutron_pack::ops::{package, PackageOptions};
use neutron_pack::util::process::SystemRunner;
use neutron_pack::util::shell::{format_duration, Shell, Status};
use neutron_pack::util::GlobalContext;

pub fn execute(args: PackageArgs, shell: &Shell) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let config = ctx.load_config();

    let opts = PackageOptions {
        output: args.output,
        installer: args.installer,
        skip_vcpkg: args.skip_vcpkg,
        profile: Profile::from_debug_flag(args.debug),
        static_lsp: args.static_lsp,
        max_attempts: args.max_attempts,
        jobs: args.jobs,
    };

    let start = Instant::now();
    let report = package(&ctx, &config, shell, &SystemRunner, &opts)?;

    let summary = format!(
        "{} {} ({} binaries) in {}",
        report.package.output.display(),
        report.version,
        report.binaries.len(),
        format_duration(start.elapsed())
    );
    if report.is_degraded() {
        shell.warn("some targets did not build cleanly; the package may be incomplete");
    }
    shell.status(Status::Finished, summary);
    if let Some(installer) = &report.installer {
        shell.status(Status::Created, installer.display());
    }

    Ok(())
}
