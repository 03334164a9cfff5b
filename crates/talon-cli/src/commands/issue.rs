use clap::Args;
use colored::Colorize;

use super::TlsArgs;

#[derive(Args)]
pub struct IssueCommand {
    #[command(flatten)]
    config: TlsArgs,
}

impl IssueCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let manager = self.config.build_manager()?;

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(manager.issue())?;

        println!(
            "{} issued certificate for {}",
            "✓".green(),
            self.config.domains.join(", ")
        );
        Ok(())
    }
}
