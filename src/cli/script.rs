//! Print the browser runtime

use anyhow::Result;
use clap::Args;

use crate::config::{Config, TransportKind};
use crate::transport::Transport;

/// Print the browser runtime for a transport
#[derive(Args, Debug)]
#[command(disable_version_flag = true)]
pub struct ScriptCommand {
    /// Transport the script should speak [default: from config]
    #[arg(short, long, value_enum)]
    pub transport: Option<TransportKind>,

    /// Version the page is assumed to be at
    #[arg(long, default_value_t = 1)]
    pub version: u64,

    /// Wrap in a <script type="module"> tag
    #[arg(long)]
    pub tag: bool,
}

impl ScriptCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        let mut config = Config::load_or_default(config_path)?;
        if let Some(transport) = self.transport {
            config.reload.transport = transport;
        }

        println!("{}", self.render(&config));
        Ok(())
    }

    fn render(&self, config: &Config) -> String {
        let transport = Transport::new(
            config.reload.transport,
            config,
            crate::reload::BuildStatus::initial(0),
        );
        let script = transport.client_script(self.version, config);

        if self.tag {
            format!("<script type=\"module\">{}</script>", script)
        } else {
            script
        }
    }
}
