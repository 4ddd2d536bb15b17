//! The directed acyclic graph of reconciliation tasks.
//!
//! Tasks are stored in one arena (`Vec<Task>`); edges are `usize` indices
//! into that arena rather than borrowed pointers, so the whole DAG is a
//! single owned value with no lifetime parameter, exactly the
//! "arena + index" alternative to the source's pointer graph that
//! DESIGN NOTES §9 calls out. The DAG owns its tasks; the runner only
//! borrows them.

use std::fmt;

use super::task::{Task, TaskState};

/// The reconciliation output: a set of tasks and the dependency edges
/// between them. Acyclic by construction (see the reconciler module).
#[derive(Debug, Clone, Default)]
pub struct Dag {
    tasks: Vec<Task>,
}

impl Dag {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn num_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, index: usize) -> &Task {
        &self.tasks[index]
    }

    pub fn task_mut(&mut self, index: usize) -> &mut Task {
        &mut self.tasks[index]
    }

    fn upstream_done(&self, index: usize) -> bool {
        self.tasks[index]
            .up_stream
            .iter()
            .all(|&u| self.tasks[u].is_done())
    }

    fn cannot_run(&self, index: usize) -> bool {
        self.tasks[index].up_stream.iter().any(|&u| {
            matches!(self.tasks[u].state, TaskState::Failed | TaskState::Skipped)
        })
    }

    pub fn is_waiting(&self, index: usize) -> bool {
        self.tasks[index].state == TaskState::Pending && self.upstream_done(index)
    }

    pub fn cannot_run_index(&self, index: usize) -> bool {
        self.cannot_run(index)
    }

    /// Indices of tasks that are `Pending` with every upstream task settled.
    pub fn get_waiting(&self) -> Vec<usize> {
        (0..self.tasks.len()).filter(|&i| self.is_waiting(i)).collect()
    }

    /// Tasks that ended in the `Failed` state.
    pub fn get_failed(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.state == TaskState::Failed).collect()
    }

    /// Whether any task has not yet reached a terminal state.
    pub fn pending_exists(&self) -> bool {
        self.tasks
            .iter()
            .any(|t| matches!(t.state, TaskState::Pending | TaskState::Running))
    }
}

impl fmt::Display for Dag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, task) in self.tasks.iter().enumerate() {
            let upstream: Vec<String> = task
                .up_stream
                .iter()
                .map(|&u| format!("{}({})", self.tasks[u].task_type, self.tasks[u].identifier))
                .collect();
            let downstream: Vec<String> = task
                .down_stream
                .iter()
                .map(|&d| format!("{}({})", self.tasks[d].task_type, self.tasks[d].identifier))
                .collect();
            writeln!(
                f,
                "#{i} name: {}({}), upstream: [{}], downstream: [{}]",
                task.task_type,
                task.identifier,
                upstream.join(","),
                downstream.join(",")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redshift::task::TaskPayload;
    use chrono::Utc;

    fn task(identifier: &str, ty: super::super::task::TaskType) -> Task {
        Task::new(
            identifier,
            ty,
            TaskPayload::membership("hubble", "jwr_bi_analyst", "bi_analyst"),
            Utc::now(),
        )
    }

    #[test]
    fn waiting_requires_all_upstream_done() {
        use super::super::task::TaskType;
        let mut t0 = task("a", TaskType::CreateGroup);
        let mut t1 = task("b", TaskType::AddToGroup);
        t1.up_stream.push(0);
        t0.down_stream.push(1);

        let mut dag = Dag::new(vec![t0, t1]);
        assert_eq!(dag.get_waiting(), vec![0]);

        dag.task_mut(0).state = TaskState::Success;
        assert_eq!(dag.get_waiting(), vec![1]);
    }

    #[test]
    fn failed_upstream_marks_downstream_as_unable_to_run() {
        use super::super::task::TaskType;
        let mut t0 = task("a", TaskType::CreateGroup);
        let mut t1 = task("b", TaskType::AddToGroup);
        t1.up_stream.push(0);
        t0.down_stream.push(1);
        t0.state = TaskState::Failed;

        let dag = Dag::new(vec![t0, t1]);
        assert!(dag.cannot_run_index(1));
    }
}
