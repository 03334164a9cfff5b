use chrono::Utc;
use clap::Args;
use colored::Colorize;

use super::TlsArgs;

#[derive(Args)]
pub struct ListCommand {
    #[command(flatten)]
    config: TlsArgs,
}

impl ListCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let manager = self.config.build_manager()?;

        let rt = tokio::runtime::Runtime::new()?;
        let certs = rt.block_on(manager.list())?;

        if certs.is_empty() {
            println!("No certificates stored.");
            return Ok(());
        }

        for cert in certs {
            let days_left = (cert.not_after - Utc::now()).num_days();
            let expiry = format!("{} ({} days)", cert.not_after.format("%Y-%m-%d"), days_left);
            let expiry = if days_left < 0 {
                expiry.red()
            } else if days_left <= 30 {
                expiry.yellow()
            } else {
                expiry.green()
            };

            println!("{}", cert.common_name.bold());
            println!("  expires: {}", expiry);
            if !cert.subject_alternative_names.is_empty() {
                println!("  names:   {}", cert.subject_alternative_names.join(", "));
            }
            println!("  source:  {}", cert.source_path);
        }
        Ok(())
    }
}
