use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gcs-share")]
#[command(version, about = "Share files publicly via Google Cloud Storage", long_about = None)]
pub struct Cli {
    /// Google Cloud project (defaults to GCS_SHARE_PROJECT, then the gcloud default)
    #[arg(short, long, global = true)]
    pub project: Option<String>,

    /// Cloud Storage API endpoint (defaults to GCS_SHARE_ENDPOINT)
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Serve the tools over stdio (default)
    Serve,

    /// Upload a file and make it public
    Share {
        /// Path to the local file
        file_path: String,

        /// Target bucket, created if missing
        #[arg(short, long)]
        bucket: Option<String>,

        /// Object name in the bucket (default: the file name)
        #[arg(short, long)]
        destination: Option<String>,
    },

    /// Check Google Cloud authentication
    Auth,

    /// List accessible buckets
    Buckets,
}
