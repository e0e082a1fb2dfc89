mod cli;

use std::fs;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use block_dev::BlockDevice;
use clap::Parser;
use cli::{Cli, Command};
use sector_fs::FileSystem;
use sector_fs_fuse::{BlockFile, into_io, perf_test, split_path};

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if let Command::Format { sectors } = cli.command {
        let block_file: Arc<dyn BlockDevice> = Arc::new(BlockFile::create(&cli.image, sectors)?);
        let fs = FileSystem::format(block_file, sectors).map_err(into_io)?;
        println!(
            "image={:?} sectors={sectors} free={}",
            cli.image,
            fs.free_sectors().map_err(into_io)?
        );
        return Ok(());
    }

    let block_file: Arc<dyn BlockDevice> = Arc::new(BlockFile::open(&cli.image)?);
    let mut fs = FileSystem::mount(block_file)
        .map_err(into_io)?
        .with_clock(now);

    match cli.command {
        Command::Format { .. } => unreachable!(),
        Command::Mkdir { path } => {
            let (dir, name) = split(&path)?;
            fs.create(name, 0, true, dir).map_err(into_io)?;
        }
        Command::Touch { path, size } => {
            let (dir, name) = split(&path)?;
            fs.create(name, size, false, dir).map_err(into_io)?;
        }
        Command::Cp { source, target } => {
            let (dir, name) = split(&target)?;
            let data = fs::read(&source)?;
            fs.create(name, data.len(), false, dir).map_err(into_io)?;
            let file = fs.open(name, dir).map_err(into_io)?;
            file.write_at(&data, 0).map_err(into_io)?;
            log::info!("copied {} bytes from {source:?} to {target:?}", data.len());
        }
        Command::Cat { path } => {
            let (dir, name) = split(&path)?;
            let file = fs.open(name, dir).map_err(into_io)?;
            let mut data = vec![0; file.len()];
            file.read_at(&mut data, 0).map_err(into_io)?;
            io::stdout().write_all(&data)?;
        }
        Command::Rm { path } => {
            let (dir, name) = split(&path)?;
            fs.remove(name, dir).map_err(into_io)?;
        }
        Command::Ls { path } => {
            for listing in fs.list_all(&path).map_err(into_io)? {
                print!("{listing}");
            }
        }
        Command::Dump => print!("{}", fs.report().map_err(into_io)?),
        Command::Perf => {
            let stats = perf_test(&mut fs).map_err(into_io)?;
            println!(
                "wrote {} bytes, read {} bytes",
                stats.bytes_written, stats.bytes_read
            );
        }
    }

    Ok(())
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

fn split(path: &str) -> io::Result<(&str, &str)> {
    split_path(path).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{path:?} does not name a file"),
        )
    })
}
