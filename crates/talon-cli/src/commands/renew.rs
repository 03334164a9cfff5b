use clap::Args;
use colored::Colorize;

use super::TlsArgs;

#[derive(Args)]
pub struct RenewCommand {
    #[command(flatten)]
    config: TlsArgs,

    /// Reuse the stored private key instead of generating a new one
    #[arg(long)]
    reuse_key: bool,
}

impl RenewCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let manager = self.config.build_manager()?;

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(manager.renew(self.reuse_key))?;

        println!(
            "{} renewal pass finished for {}",
            "✓".green(),
            self.config.domains.join(", ")
        );
        Ok(())
    }
}
