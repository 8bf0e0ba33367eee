use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
pub(crate) struct Opts {
    /// Path a previously generated secret was written to (see `gen-secret`).
    #[arg(long, env = "GOSSIPD_SECRET_PATH", global = true)]
    pub secret_path: Option<PathBuf>,

    /// TOML file populating [`crate::config::Config`]'s non-default fields;
    /// reading it is this binary's concern, not the core's.
    #[arg(long, env = "GOSSIPD_CONFIG_PATH", global = true)]
    pub config_path: Option<PathBuf>,

    /// Accepted for forward compatibility with a metrics exporter; this
    /// binary does not itself serve `/metrics` (the serving surface is an
    /// external collaborator), but `Gossipd::build`'s `Metrics::registry`
    /// is ready for whatever an embedder wires here.
    #[arg(long, env = "GOSSIPD_METRICS_BIND", global = true)]
    pub metrics_bind: Option<std::net::SocketAddr>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Generates a fresh Ed25519 signing key and prints the resulting
    /// `PeerId` plus the secret's base32 encoding.
    GenSecret,
    /// Runs the gossip daemon and consensus manager against whatever
    /// transport/`ConsensusFunctions` an embedder wired in via
    /// [`crate::Gossipd::builder`]; this binary supplies none itself
    /// (transport implementation is out of scope), so `Run` is illustrative
    /// wiring only.
    Run,
}
