use std::path::PathBuf;

use anyhow::Context;
use clear_pipeline::{
    CatalogSet, DryRunReducer, ExternalReducer, Field, Paths, Pipeline, RefFilter, RunRequest,
    Step, SurveyConfig, CLEAR_FIELDS,
};
use log::warn;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "clear-pipeline", about = "CLEAR G102 grism reduction pipeline")]
struct Opt {
    /// Fields to process [default: the 12 CLEAR pointings]
    #[structopt(short, long, use_delimiter = true)]
    fields: Vec<Field>,
    /// Steps to run: 1 interlace, 2 model, 3 extract, 4 stack, 5 fit [default: all]
    #[structopt(short, long, use_delimiter = true)]
    steps: Vec<Step>,
    /// Faintest magnitude extracted [default: the whole catalog]
    #[structopt(short, long)]
    mlim: Option<f64>,
    /// Reference image filter: F105W or F125W
    #[structopt(short, long = "ref", default_value = "F105W")]
    ref_filter: RefFilter,
    /// Source catalogs: quiescent, emitters, zn, full or ivas
    #[structopt(short, long, default_value = "full")]
    cats: CatalogSet,
    /// Maximum number of objects fitted per visit
    #[structopt(long)]
    fit_limit: Option<usize>,
    /// Leave the extractions in the working directory
    #[structopt(long)]
    no_archive: bool,
    /// Reduction program, called as `<reducer> [reducer-arg..] <task>`
    #[structopt(long, default_value = "clear-reduce")]
    reducer: PathBuf,
    /// Arguments passed to the reduction program before the task name
    #[structopt(long = "reducer-arg")]
    reducer_args: Vec<String>,
    /// Survey configuration JSON file [default: CLEAR catalogs and reference images]
    #[structopt(long)]
    survey: Option<PathBuf>,
    /// Directory holding the `REF` folder [env: CLEAR_REF_PATH]
    #[structopt(long)]
    ref_path: Option<PathBuf>,
    /// Extractions archive directory [env: CLEAR_EXTRACTIONS_PATH]
    #[structopt(long)]
    extractions: Option<PathBuf>,
    /// Working directory [env: CLEAR_OUTPUTS_PATH, default: .]
    #[structopt(long)]
    outputs: Option<PathBuf>,
    /// Display a progress bar for the objects of each visit
    #[structopt(long)]
    progress: bool,
    /// Log the reduction jobs instead of running them, nothing is archived
    #[structopt(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let config = match &opt.survey {
        Some(path) => SurveyConfig::from_path(path)
            .with_context(|| format!("failed to load the survey configuration {path:?}"))?,
        None => SurveyConfig::default(),
    };
    let paths = Paths::from_env_or(
        opt.ref_path.clone(),
        opt.extractions.clone(),
        opt.outputs.clone(),
    )?;

    let fields = if opt.fields.is_empty() {
        CLEAR_FIELDS
            .iter()
            .map(|name| Field::new(name))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        opt.fields.clone()
    };
    let mut request = RunRequest::new(fields)
        .catalogs(opt.cats)
        .ref_filter(opt.ref_filter)
        .archive(!(opt.no_archive || opt.dry_run));
    if !opt.steps.is_empty() {
        request = request.steps(opt.steps.iter().copied());
    }
    if let Some(mag_lim) = opt.mlim {
        request = request.mag_lim(mag_lim);
    }
    if let Some(fit_limit) = opt.fit_limit {
        request = request.fit_limit(fit_limit);
    }

    let summary = if opt.dry_run {
        Pipeline::new(&config, &paths, DryRunReducer)
            .progress(opt.progress)
            .run(&request)?
    } else {
        let reducer = ExternalReducer::new(&opt.reducer)
            .args(opt.reducer_args.iter().cloned())
            .workdir(&paths.outputs);
        Pipeline::new(&config, &paths, reducer)
            .progress(opt.progress)
            .run(&request)?
    };
    summary.summary();
    if summary.failed() > 0 {
        warn!(
            "{} objects failed, their errors are listed in the archived outcomes.csv",
            summary.failed()
        );
    }
    Ok(())
}
