use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use log::debug;
use serde::{de::DeserializeOwned, Serialize};

use super::{
    ContaminationModel, ExtractJob, FitJob, InterlaceJob, MaskJob, ModelJob, Products, Reducer,
    ReducerError, Result, StackJob, Task,
};

/// Runs each reduction task as `<program> [args..] <task>` in the working directory
///
/// The job is written as JSON to the program standard input and the reply is
/// read as JSON from its standard output.
#[derive(Debug, Clone)]
pub struct ExternalReducer {
    program: PathBuf,
    args: Vec<String>,
    workdir: PathBuf,
}
impl ExternalReducer {
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: vec![],
            workdir: PathBuf::from("."),
        }
    }
    /// Arguments inserted before the task name
    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..self
        }
    }
    pub fn workdir<P: AsRef<Path>>(self, workdir: P) -> Self {
        Self {
            workdir: workdir.as_ref().to_path_buf(),
            ..self
        }
    }
    fn call<J, R>(&self, task: Task, job: &J) -> Result<R>
    where
        J: Serialize,
        R: DeserializeOwned,
    {
        let request = serde_json::to_vec(job)?;
        debug!("{:?} {task}", self.program);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(task.to_string())
            .current_dir(&self.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ReducerError::Spawn(e, self.program.clone()))?;
        if let Some(mut stdin) = child.stdin.take() {
            // a program exiting before reading its job is reported by its exit status
            match stdin.write_all(&request) {
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!("{:?} {task} closed its standard input", self.program)
                }
                result => result?,
            }
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(ReducerError::Failed {
                task,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let reply = String::from_utf8_lossy(&output.stdout);
        let reply = match reply.trim() {
            "" => "{}",
            reply => reply,
        };
        Ok(serde_json::from_str(reply)?)
    }
}
impl Reducer for ExternalReducer {
    fn interlace(&mut self, job: &InterlaceJob) -> Result<Products> {
        self.call(Task::Interlace, job)
    }
    fn build_model(&mut self, job: &ModelJob) -> Result<ContaminationModel> {
        self.call(Task::BuildModel, job)
    }
    fn refine_mask_background(&mut self, job: &MaskJob) -> Result<Products> {
        self.call(Task::RefineMaskBackground, job)
    }
    fn extract(&mut self, job: &ExtractJob) -> Result<Products> {
        self.call(Task::Extract, job)
    }
    fn stack(&mut self, job: &StackJob) -> Result<Products> {
        self.call(Task::Stack, job)
    }
    fn fit_redshift(&mut self, job: &FitJob) -> Result<Products> {
        self.call(Task::FitRedshift, job)
    }
    fn fit_emission_lines(&mut self, job: &FitJob) -> Result<Products> {
        self.call(Task::FitEmissionLines, job)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{error::Error, fs};

    use super::*;
    use crate::resolver::Visit;

    const SCRIPT: &str = r#"cat > job.json
case "$1" in
    extract) echo '{"files": ["GS5-13-000-G102_00312.2D.fits"]}' ;;
    stack) ;;
    *) echo "unsupported task $1" >&2; exit 3 ;;
esac"#;

    fn reducer(workdir: &Path) -> ExternalReducer {
        ExternalReducer::new("sh")
            .args(["-c", SCRIPT, "clear-reduce"])
            .workdir(workdir)
    }

    #[test]
    fn extract_reply() -> std::result::Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let mut reducer = reducer(dir.path());
        let products = reducer.extract(&ExtractJob::new(&Visit::new("GS5-13-000"), 312, 24.))?;
        assert_eq!(
            products.files,
            vec![PathBuf::from("GS5-13-000-G102_00312.2D.fits")]
        );
        let job = fs::read_to_string(dir.path().join("job.json"))?;
        assert!(job.contains(r#""id":312"#), "{job}");
        Ok(())
    }

    #[test]
    fn empty_reply() -> std::result::Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let products = reducer(dir.path()).stack(&crate::reducer::StackJob::new(
            &crate::Field::new("GS5")?,
            312,
            vec![],
        ))?;
        assert!(products.is_empty());
        Ok(())
    }

    #[test]
    fn failed_task() {
        let dir = tempfile::tempdir().unwrap();
        let err = reducer(dir.path())
            .build_model(&ModelJob::new(&Visit::new("GS5-13-000"), 24.))
            .unwrap_err();
        match err {
            ReducerError::Failed { task, stderr, .. } => {
                assert_eq!(task, Task::BuildModel);
                assert_eq!(stderr, "unsupported task build-model");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn exit_without_reading_the_job() -> std::result::Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let mut reducer = ExternalReducer::new("sh")
            .args(["-c", "echo 'ImportError: grizli' >&2; exit 3", "clear-reduce"])
            .workdir(dir.path());
        // larger than a pipe buffer so that the write always hits a closed pipe
        let job = StackJob::new(
            &crate::Field::new("GS5")?,
            312,
            (0..20_000)
                .map(|k| PathBuf::from(format!("GS5-{k:05}-000-G102_00312.2D.fits")))
                .collect(),
        );
        for _ in 0..5 {
            match reducer.stack(&job) {
                Err(ReducerError::Failed { task, status, stderr }) => {
                    assert_eq!(task, Task::Stack);
                    assert!(status.contains('3'), "{status}");
                    assert_eq!(stderr, "ImportError: grizli");
                }
                other => panic!("unexpected reply: {other:?}"),
            }
        }
        Ok(())
    }

    #[test]
    fn missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let err = ExternalReducer::new("/nonexistent/clear-reduce")
            .workdir(dir.path())
            .extract(&ExtractJob::new(&Visit::new("GS5-13-000"), 1, 24.))
            .unwrap_err();
        assert!(matches!(err, ReducerError::Spawn(..)));
    }
}
