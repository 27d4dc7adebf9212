//! dibk CLI: store and retrieve versioned, block-deduplicated backups of
//! large binary artifacts.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use dibk::{engine, Configuration, Store};

#[derive(Parser, Debug)]
#[command(name = "dibk", about = "versioned, block-deduplicating backup engine")]
struct Opt {
	#[command(subcommand)]
	cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Save a file as a new version of an object.
	Store {
		#[arg(long)]
		name: String,
		#[arg(long)]
		input: PathBuf,
		/// Block size in megabytes.
		#[arg(long = "mbperblock")]
		mb_per_block: i64,
		#[arg(long, env = "DIBK_DB")]
		db: PathBuf,
		#[arg(long, env = "DIBK_STORAGE")]
		storage: PathBuf,
		#[arg(long)]
		directio: bool,
	},
	/// Reconstruct a version of an object.
	Retrieve {
		#[arg(long)]
		name: String,
		#[arg(long, conflicts_with = "latest")]
		version: Option<i64>,
		#[arg(long)]
		latest: bool,
		#[arg(long)]
		output: PathBuf,
		#[arg(long, env = "DIBK_DB")]
		db: PathBuf,
		#[arg(long, env = "DIBK_STORAGE")]
		storage: PathBuf,
		#[arg(long)]
		directio: bool,
	},
}

#[tokio::main]
async fn main() {
	if std::env::var("RUST_LOG").is_err() {
		std::env::set_var("RUST_LOG", "dibk=info");
	}
	tracing_subscriber::fmt()
		.with_writer(std::io::stderr)
		.with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
		.init();

	let opt = Opt::parse();

	if let Err(e) = run(opt).await {
		eprintln!("Error: {}", e);
		std::process::exit(1);
	}
}

async fn run(opt: Opt) -> Result<(), dibk::Error> {
	match opt.cmd {
		Command::Store {
			name,
			input,
			mb_per_block,
			db,
			storage,
			directio,
		} => {
			let config = Configuration {
				db_path: db,
				storage_location: storage,
				is_direct_io_enabled: directio,
			};
			std::fs::create_dir_all(&config.storage_location)?;
			let store = Arc::new(Store::open(&config.db_path)?);
			let ov = engine::save(store, &config, &name, &input, mb_per_block).await?;
			println!("saved {} version {}", ov.name, ov.version);
			Ok(())
		}
		Command::Retrieve {
			name,
			version,
			latest,
			output,
			db,
			storage,
			directio,
		} => {
			if version.is_none() && !latest {
				return Err(dibk::Error::message("one of --version or --latest is required"));
			}
			let config = Configuration {
				db_path: db,
				storage_location: storage,
				is_direct_io_enabled: directio,
			};
			let store = Arc::new(Store::open(&config.db_path)?);
			let ov = engine::retrieve(store, &config, &name, version, &output).await?;
			println!("retrieved {} version {}", ov.name, ov.version);
			Ok(())
		}
	}
}
