use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "duet-server", about = "Duet messaging server")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/duet.toml")]
    pub config: String,
}
