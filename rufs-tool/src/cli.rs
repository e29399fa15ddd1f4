use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rufs::Geometry;

#[derive(Parser)]
#[command(version, about = "Inspect and populate rufs images")]
pub struct Cli {
    /// Image file backing the volume
    #[arg(long, short, default_value = "fs.img")]
    pub image: PathBuf,

    #[command(flatten)]
    pub geometry: GeometryArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Used when the image is created; an existing image keeps its own layout
#[derive(Args)]
pub struct GeometryArgs {
    /// Block size in bytes, a multiple of 128
    #[arg(long, default_value_t = Geometry::default().block_size)]
    pub block_size: usize,

    /// Number of inodes
    #[arg(long, default_value_t = Geometry::default().max_inodes)]
    pub inodes: u32,

    /// Number of data blocks
    #[arg(long, default_value_t = Geometry::default().max_blocks)]
    pub blocks: u32,
}

#[derive(Subcommand)]
pub enum Command {
    /// Format a fresh image, discarding the old one
    Mkfs,

    /// Copy the regular files of a host directory into the volume
    Pack {
        /// Host source directory
        #[arg(long, short)]
        source: PathBuf,

        /// Target directory in the volume
        #[arg(default_value = "/")]
        dir: String,
    },

    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Show the attributes of a file or directory
    Stat { path: String },

    /// Create a directory
    Mkdir {
        path: String,

        /// Permission bits in octal
        #[arg(long, short, default_value = "755", value_parser = parse_mode)]
        mode: u32,
    },

    /// Create an empty file
    Touch {
        path: String,

        /// Permission bits in octal
        #[arg(long, short, default_value = "644", value_parser = parse_mode)]
        mode: u32,
    },

    /// Write a host file into the volume, creating the target if needed
    Put {
        /// Host file to read
        host: PathBuf,

        /// Target file in the volume
        path: String,

        /// Byte offset to write at
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },

    /// Print a file to stdout
    Cat { path: String },

    /// Remove a file
    Rm { path: String },

    /// Remove an empty directory
    Rmdir { path: String },
}

impl From<&GeometryArgs> for Geometry {
    fn from(args: &GeometryArgs) -> Self {
        Geometry::new(args.block_size, args.inodes, args.blocks)
    }
}

fn parse_mode(s: &str) -> Result<u32, String> {
    u32::from_str_radix(s, 8)
        .ok()
        .filter(|&mode| mode <= 0o7777)
        .ok_or_else(|| format!("`{s}` is not an octal permission"))
}
