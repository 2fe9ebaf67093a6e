//! Project initialization command

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::config::{Config, TransportKind, DEFAULT_CONFIG_FILE};

/// Write a starter dev-reload.toml (and index.html/style.css if missing)
#[derive(Args, Debug)]
pub struct InitCommand {
    /// Project directory
    #[arg(default_value = ".")]
    pub dir: String,

    /// Live reload transport
    #[arg(short, long, value_enum, default_value_t = TransportKind::Sse)]
    pub transport: TransportKind,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

impl InitCommand {
    pub async fn execute(&self) -> Result<()> {
        let project_dir = Path::new(&self.dir);

        eprintln!(
            "{} Initializing dev-reload with the {} transport...\n",
            "→".blue(),
            self.transport.to_string().cyan()
        );

        if self.dir != "." {
            fs::create_dir_all(project_dir).context("Failed to create project directory")?;
        }

        let config_path = project_dir.join(DEFAULT_CONFIG_FILE);
        if config_path.exists() && !self.force {
            anyhow::bail!(
                "{} already exists (use --force to overwrite)",
                config_path.display()
            );
        }

        fs::write(&config_path, self.generate_config()?)
            .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;
        eprintln!("  {} Created {}", "✓".green(), DEFAULT_CONFIG_FILE.cyan());

        write_if_missing(&project_dir.join("index.html"), INDEX_HTML)?;
        write_if_missing(&project_dir.join("style.css"), STYLE_CSS)?;

        eprintln!("\n{} Ready!\n", "✓".green().bold());
        eprintln!("  Next steps:");
        if self.dir != "." {
            eprintln!("    {} cd {}", "→".dimmed(), self.dir.cyan());
        }
        eprintln!("    {} dev-reload dev", "→".dimmed());
        eprintln!();

        Ok(())
    }

    fn generate_config(&self) -> Result<String> {
        let mut config = Config::default();
        config.reload.transport = self.transport;

        Ok(format!(
            "# dev-reload configuration\n\n{}",
            config.to_toml()?
        ))
    }
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        return Ok(());
    }

    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    eprintln!("  {} Created {}", "✓".green(), name.cyan());
    Ok(())
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>dev-reload</title>
    <link rel="stylesheet" href="/style.css" />
  </head>
  <body>
    <h1>Edit style.css and watch it update in place.</h1>
  </body>
</html>
"#;

const STYLE_CSS: &str = r#":root {
  font-family: system-ui, sans-serif;
  color-scheme: light dark;
}

h1 {
  color: #646cff;
}
"#;
