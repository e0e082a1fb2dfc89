use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version, about = "Build and inspect sector-fs disk images")]
pub struct Cli {
    /// Disk image
    #[arg(long, short, default_value = "fs.img")]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a fresh image and format it
    Format {
        /// Number of sectors of the image
        #[arg(long, short, default_value_t = 1024)]
        sectors: usize,
    },
    /// Create a directory
    Mkdir { path: String },
    /// Create a file of a fixed size
    Touch {
        path: String,
        /// File size in bytes
        #[arg(long, short, default_value_t = 0)]
        size: usize,
    },
    /// Copy a host file into the image
    Cp { source: PathBuf, target: String },
    /// Print a file
    Cat { path: String },
    /// Remove a file, or a directory with everything inside
    Rm { path: String },
    /// List a directory tree
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print the headers, the free map and the root directory
    Dump,
    /// Sequentially write, read back and remove a test file
    Perf,
}
