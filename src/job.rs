use crate::command::ExitCode;
use crate::error::{Result, ShellError};
use std::fmt;
use std::io;
use std::process::{Child, ExitStatus};

/// Identifier of a job. Allocated from a counter and never handed out twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A spawned process belonging to a job.
#[derive(Debug)]
pub struct ChildRecord {
    name: String,
    child: Child,
}

impl ChildRecord {
    pub fn new(name: impl Into<String>, child: Child) -> Self {
        Self {
            name: name.into(),
            child,
        }
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until the process terminates.
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait()
    }
}

#[derive(Debug)]
struct Job {
    id: JobId,
    children: Vec<ChildRecord>,
}

/// Bookkeeping for in-flight pipelines.
///
/// Jobs live in an arena of slots. A freed slot is reused by the next job,
/// so lookups always compare the stored id rather than trusting the slot
/// position.
#[derive(Debug, Default)]
pub struct JobRegistry {
    slots: Vec<Option<Job>>,
    last_id: u64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new, childless job.
    pub fn create(&mut self) -> JobId {
        self.last_id += 1;
        let id = JobId(self.last_id);
        let job = Job {
            id,
            children: Vec::new(),
        };
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => *slot = Some(job),
            None => self.slots.push(Some(job)),
        }
        tracing::debug!("created job {}", id);
        id
    }

    /// Attach a spawned process to `id`.
    ///
    /// When the job is unknown the child is handed back so the caller can
    /// still reap it.
    pub fn add_child(
        &mut self,
        id: JobId,
        child: ChildRecord,
    ) -> std::result::Result<(), ChildRecord> {
        match self.find_mut(id) {
            Some(job) => {
                job.children.push(child);
                Ok(())
            }
            None => Err(child),
        }
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.slot_of(id).is_some()
    }

    /// Ids of registered jobs, oldest first.
    pub fn ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.slots.iter().flatten().map(|job| job.id).collect();
        ids.sort();
        ids
    }

    /// Number of children registered under `id`.
    pub fn child_count(&self, id: JobId) -> Option<usize> {
        let slot = self.slot_of(id)?;
        self.slots[slot].as_ref().map(|job| job.children.len())
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until every child of `id` has terminated, then drop the job.
    ///
    /// Returns the status of the last child record, or 0 for a job without
    /// children. The job is removed even if reaping a child fails. An unknown
    /// id is `NotFound` and changes nothing.
    pub fn wait(&mut self, id: JobId) -> Result<ExitCode> {
        let slot = self
            .slot_of(id)
            .ok_or_else(|| ShellError::NotFound(format!("job {id}")))?;
        let Some(job) = self.slots[slot].take() else {
            return Err(ShellError::NotFound(format!("job {id}")));
        };
        tracing::debug!("waiting on job {} ({} children)", id, job.children.len());

        let mut status = 0;
        let mut failure = None;
        for mut record in job.children {
            match record.wait() {
                Ok(exit) => {
                    status = exit_code(exit);
                    tracing::debug!("ENDED: [{}] (ret={})", record.name, status);
                }
                Err(e) => {
                    tracing::warn!("failed to wait for {} ({}): {}", record.name, record.pid(), e);
                    failure.get_or_insert(e);
                }
            }
        }
        self.trim();

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(status),
        }
    }

    fn slot_of(&self, id: JobId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|job| job.id == id))
    }

    fn find_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.slots.iter_mut().flatten().find(|job| job.id == id)
    }

    fn trim(&mut self) {
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
    }
}

/// Shell status for a finished process: its exit code, or 128 + signal.
pub fn exit_code(exit_status: ExitStatus) -> ExitCode {
    match exit_status.code() {
        Some(x) => x,
        None => terminated_by_signal(exit_status),
    }
}

fn terminated_by_signal(exit_status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = exit_status.signal() {
        128 + signal
    } else if exit_status.core_dumped() {
        255
    } else {
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn spawn(program: &str, args: &[&str]) -> ChildRecord {
        let child = Command::new(program).args(args).spawn().expect("spawn");
        ChildRecord::new(program, child)
    }

    #[test]
    fn test_ids_increase_and_are_never_reused() {
        let mut jobs = JobRegistry::new();
        let a = jobs.create();
        let b = jobs.create();
        assert!(b > a);

        jobs.wait(a).unwrap();
        let c = jobs.create();
        assert!(c > b);
        assert_ne!(c, a);
        assert_eq!(jobs.ids(), vec![b, c]);
    }

    #[test]
    fn test_wait_on_childless_job_returns_immediately_and_removes_it() {
        let mut jobs = JobRegistry::new();
        let id = jobs.create();
        assert!(jobs.contains(id));

        assert_eq!(jobs.wait(id).unwrap(), 0);
        assert!(!jobs.contains(id));
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_wait_on_unknown_job_is_not_found_without_side_effects() {
        let mut jobs = JobRegistry::new();
        let kept = jobs.create();
        let gone = jobs.create();
        jobs.wait(gone).unwrap();

        let err = jobs.wait(gone).unwrap_err();
        assert!(matches!(err, ShellError::NotFound(_)));
        assert_eq!(jobs.ids(), vec![kept]);
    }

    #[test]
    fn test_wait_reports_status_of_last_child() {
        let mut jobs = JobRegistry::new();
        let id = jobs.create();
        jobs.add_child(id, spawn("true", &[])).unwrap();
        jobs.add_child(id, spawn("sh", &["-c", "exit 3"])).unwrap();
        assert_eq!(jobs.child_count(id), Some(2));

        assert_eq!(jobs.wait(id).unwrap(), 3);
        assert!(!jobs.contains(id));

        let id = jobs.create();
        jobs.add_child(id, spawn("false", &[])).unwrap();
        jobs.add_child(id, spawn("true", &[])).unwrap();
        assert_eq!(jobs.wait(id).unwrap(), 0);
    }

    #[test]
    fn test_add_child_to_unknown_job_hands_child_back() {
        let mut jobs = JobRegistry::new();
        let id = jobs.create();
        jobs.wait(id).unwrap();

        let mut record = jobs.add_child(id, spawn("true", &[])).unwrap_err();
        assert_eq!(record.name(), "true");
        record.wait().unwrap();
    }

    #[test]
    fn test_freed_slots_are_reused_with_fresh_ids() {
        let mut jobs = JobRegistry::new();
        let first = jobs.create();
        let second = jobs.create();
        jobs.wait(first).unwrap();

        let third = jobs.create();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.contains(second));
        assert!(jobs.contains(third));
        assert!(!jobs.contains(first));
    }

    #[test]
    fn test_signal_termination_maps_above_128() {
        let mut child = Command::new("sh")
            .args(["-c", "kill -9 $$"])
            .spawn()
            .unwrap();
        let status = child.wait().unwrap();
        assert_eq!(exit_code(status), 128 + 9);
    }
}
