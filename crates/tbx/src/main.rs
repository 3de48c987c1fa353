// TBX - Traceback Explorer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! TBX - Traceback Explorer
//!
//! Capture an error on one machine, upload it, and inspect it on another.

use std::{net::IpAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use eyre::Result;

mod cmd;

/// Command-line interface for TBX
#[derive(Debug, Parser)]
#[command(name = "tbx")]
#[command(about = "Traceback Explorer - capture errors remotely and inspect them as if they were live")]
#[command(version)]
pub struct Cli {
    /// Verbosity level (repeat for more: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the explorer web server
    Serve(ServeArgs),
    /// Upload a traceback dump to an explorer
    UploadTb {
        /// Traceback dump file
        file: PathBuf,
        /// Id to store the traceback under
        id: String,
        /// Explorer URL
        #[arg(long, env = "TB_EXPLORER_HOST")]
        host: Option<String>,
    },
    /// Upload a dataframe file to an explorer
    UploadDf {
        /// Dataframe file, sent as is
        file: PathBuf,
        /// Id to store the dataframe under
        id: String,
        /// Explorer URL
        #[arg(long, env = "DF_EXPLORER_HOST")]
        host: Option<String>,
    },
    /// Print a traceback dump to the terminal
    Inspect {
        /// Traceback dump file
        file: PathBuf,
        /// Number of source lines shown around the failing line
        #[arg(long, default_value = "2")]
        context: u32,
    },
    /// Capture a sample failure and upload it or write it to a file
    Demo {
        /// Write the dump to this file instead of uploading it
        #[arg(long)]
        output: Option<PathBuf>,
        /// Id to upload the traceback under
        #[arg(long, default_value = "demo")]
        id: String,
        /// Explorer URL
        #[arg(long, env = "TB_EXPLORER_HOST")]
        host: Option<String>,
    },
}

/// Web server arguments
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Path of the data storing folder
    #[arg(long, env = "TBX_STORAGE", default_value = "./store")]
    pub storage: PathBuf,

    /// Address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// TCP port number
    #[arg(long, env = "TBX_PORT", default_value = "5000")]
    pub port: u16,

    /// Only log to the console
    #[arg(long)]
    pub no_log_file: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            cmd::init_logging_for(cli.verbose, Some(!args.no_log_file))?;
            cmd::serve(args).await
        }
        Commands::UploadTb { file, id, host } => {
            cmd::init_logging_for(cli.verbose, None)?;
            cmd::upload_traceback(&file, &id, host.as_deref()).await
        }
        Commands::UploadDf { file, id, host } => {
            cmd::init_logging_for(cli.verbose, None)?;
            cmd::upload_dataframe(&file, &id, host.as_deref()).await
        }
        Commands::Inspect { file, context } => {
            cmd::init_logging_for(cli.verbose, None)?;
            cmd::inspect(&file, context)
        }
        Commands::Demo { output, id, host } => {
            cmd::init_logging_for(cli.verbose, None)?;
            cmd::demo(output.as_deref(), &id, host.as_deref()).await
        }
    }
}
