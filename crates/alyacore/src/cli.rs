use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "alya-fetch")]
#[command(author, version, about = "Fetch YouTube audio/video into the Alya download cache", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a link or video id to an audio file
    Audio {
        /// YouTube link or bare video id
        reference: String,
    },

    /// Resolve a link or video id to an mp4 file
    Video {
        /// YouTube link or bare video id
        reference: String,
    },

    /// Delete cached files older than the retention window, once
    Sweep,

    /// Inspect or manage the yt-dlp cookies
    Cookies {
        #[command(subcommand)]
        action: CookiesCommand,
    },

    /// List the non-DASH formats yt-dlp reports for a link
    Formats {
        reference: String,

        /// Also print the summed size of all formats
        #[arg(long)]
        size: bool,
    },

    /// Print the video ids of a playlist
    Playlist {
        link: String,

        /// Stop after this many entries
        #[arg(short, long, default_value_t = 25)]
        limit: u32,
    },
}

#[derive(Subcommand)]
pub enum CookiesCommand {
    /// Show the active file, backups and pool with an offline diagnostic
    Status,
    /// Check the active cookies against YouTube with yt-dlp
    Validate,
    /// Snapshot the active cookies into the backup directory
    Backup {
        /// Backup file name (defaults to cookies_backup_<timestamp>.txt)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Overwrite the active cookies with a backup
    Restore { name: String },
    /// List backups, newest first
    List,
    /// Replace the active cookies with a Netscape file, rolling back if it fails validation
    Update { file: PathBuf },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
