use anyhow::Result;
use clap::Args;
use system_profile::SystemProfile;

use crate::cli::Output;
use crate::config::ParForConfig;
use crate::parallel::ThreadPool;

#[derive(Args, Default)]
pub struct InfoArgs {
    /// Also start the shared pool and report its live state
    #[arg(long)]
    pub pool: bool,
}

pub fn execute(args: InfoArgs, config: &ParForConfig, output: &Output) -> Result<()> {
    let profile = SystemProfile::get();

    output.category("System");
    output.key_value("OS:", &profile.os_name, false);
    output.key_value("Logical CPUs:", &profile.cpu_count.to_string(), true);
    output.key_value("Physical CPUs:", &profile.physical_cpu_count.to_string(), false);
    output.key_value(
        "Memory:",
        &format!(
            "{:.1} GB available of {:.1} GB",
            profile.available_memory_gb(),
            profile.total_memory_gb()
        ),
        false,
    );

    output.category("Parallel loops");
    output.key_value("Pool capacity:", &config.pool_capacity().to_string(), true);
    output.key_value("Default workers:", &config.default_workers().to_string(), false);
    output.key_value("Check interval:", &config.run.check_interval.to_string(), false);

    if args.pool {
        let pool = ThreadPool::global();
        output.key_value("Live threads:", &pool.capacity().to_string(), false);
        output.key_value("Tasks in flight:", &pool.in_flight().to_string(), false);
    }
    output.verbose(&profile.summary());
    Ok(())
}
