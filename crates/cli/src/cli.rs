use clap::Parser;

/// Manual control for the on-demand game server.
///
/// Applies one command to every service in the configured cluster whose
/// name matches the configured service pattern.
#[derive(Parser, Debug)]
#[command(name = "waker", version, about = "Start, stop or redeploy the game server services")]
pub struct CliArgs {
    /// One of: up, down, redeploy
    pub command: String,

    /// Config profile; keys are read as `{PROFILE}_{KEY}` before `{KEY}`
    #[arg(long, env = "WAKER_PROFILE")]
    pub profile: Option<String>,

    /// Cluster override (defaults to CLUSTER)
    #[arg(long)]
    pub cluster: Option<String>,

    /// Service name or `*` glob override (defaults to SERVICE)
    #[arg(long)]
    pub service: Option<String>,
}
