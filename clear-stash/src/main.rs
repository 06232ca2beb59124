use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clear_pipeline::{config::OUTPUTS_PATH_ENV, make_timestamp_dir};
use log::{debug, info};
use structopt::StructOpt;
use strum_macros::{Display, EnumString};

/// Processing stage of the outputs being frozen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
enum StoreType {
    Prep,
    Interlace,
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "clear-stash",
    about = "Freezes the CLEAR outputs directory into a time-stamped copy"
)]
struct Opt {
    /// Stage of the outputs: prep or interlace
    store_type: StoreType,
    /// Directory the time-stamped copy is written to
    dest: PathBuf,
    /// Outputs directory [env: CLEAR_OUTPUTS_PATH, default: .]
    #[structopt(long)]
    outputs: Option<PathBuf>,
}

/// Copies the files of `outputs` into `<dest>/YYYY.MM.DD.hh:mm:ss_<store type>`
fn stash(outputs: &Path, dest: &Path, store_type: StoreType) -> anyhow::Result<PathBuf> {
    // a stamp whose suffixed name is taken is held until a free one is found
    let mut taken = vec![];
    let dir = loop {
        let stamp = make_timestamp_dir(dest)?;
        let mut name = stamp.clone().into_os_string();
        name.push(format!("_{store_type}"));
        let dir = PathBuf::from(name);
        if dir.exists() {
            taken.push(stamp);
            continue;
        }
        fs::rename(&stamp, &dir).with_context(|| format!("failed to rename {stamp:?}"))?;
        break dir;
    };
    for stamp in taken {
        fs::remove_dir(&stamp).with_context(|| format!("failed to remove {stamp:?}"))?;
    }
    let mut count = 0;
    for entry in fs::read_dir(outputs).with_context(|| format!("failed to read {outputs:?}"))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        fs::copy(&path, dir.join(file_name))
            .with_context(|| format!("failed to copy {path:?}"))?;
        debug!("{path:?} copied");
        count += 1;
    }
    info!("{count} files of {outputs:?} stashed into {dir:?}");
    Ok(dir)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();
    let outputs = opt
        .outputs
        .or_else(|| env::var_os(OUTPUTS_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let dir = stash(&outputs, &opt.dest, opt.store_type)?;
    println!("{}", dir.display());
    Ok(())
}
