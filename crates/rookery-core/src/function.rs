use serde::{Deserialize, Serialize};

/// A function an executor has registered, plus its execution statistics.
///
/// `(executor_id, func_name)` is unique. Wait/exec stats are updated on every
/// successful close of a process running this function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    #[serde(rename = "functionid")]
    pub function_id: String,

    #[serde(rename = "executorid")]
    pub executor_id: String,

    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "funcname")]
    pub func_name: String,

    /// Number of successful executions folded into the stats.
    #[serde(default)]
    pub counter: i64,

    #[serde(rename = "minwaittime", default)]
    pub min_wait_time: f64,

    #[serde(rename = "maxwaittime", default)]
    pub max_wait_time: f64,

    #[serde(rename = "minexectime", default)]
    pub min_exec_time: f64,

    #[serde(rename = "maxexectime", default)]
    pub max_exec_time: f64,

    #[serde(rename = "avgwaittime", default)]
    pub avg_wait_time: f64,

    #[serde(rename = "avgexectime", default)]
    pub avg_exec_time: f64,
}

impl Function {
    pub fn new(
        executor_id: impl Into<String>,
        colony_id: impl Into<String>,
        func_name: impl Into<String>,
    ) -> Self {
        Self {
            function_id: crate::generate_id(),
            executor_id: executor_id.into(),
            colony_id: colony_id.into(),
            func_name: func_name.into(),
            counter: 0,
            min_wait_time: 0.0,
            max_wait_time: 0.0,
            min_exec_time: 0.0,
            max_exec_time: 0.0,
            avg_wait_time: 0.0,
            avg_exec_time: 0.0,
        }
    }

    /// Fold one successful execution's wait and exec durations (seconds)
    /// into the running min/max/avg statistics.
    pub fn record_execution(&mut self, wait_time: f64, exec_time: f64) {
        if self.counter == 0 {
            self.min_wait_time = wait_time;
            self.max_wait_time = wait_time;
            self.min_exec_time = exec_time;
            self.max_exec_time = exec_time;
            self.avg_wait_time = wait_time;
            self.avg_exec_time = exec_time;
        } else {
            self.min_wait_time = self.min_wait_time.min(wait_time);
            self.max_wait_time = self.max_wait_time.max(wait_time);
            self.min_exec_time = self.min_exec_time.min(exec_time);
            self.max_exec_time = self.max_exec_time.max(exec_time);
            let n = self.counter as f64;
            self.avg_wait_time = (self.avg_wait_time * n + wait_time) / (n + 1.0);
            self.avg_exec_time = (self.avg_exec_time * n + exec_time) / (n + 1.0);
        }
        self.counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_execution_sets_all_stats() {
        let mut function = Function::new(crate::generate_id(), crate::generate_id(), "echo");
        function.record_execution(2.0, 10.0);
        assert_eq!(function.counter, 1);
        assert_eq!(function.min_wait_time, 2.0);
        assert_eq!(function.max_exec_time, 10.0);
        assert_eq!(function.avg_exec_time, 10.0);
    }

    #[test]
    fn test_stats_fold() {
        let mut function = Function::new(crate::generate_id(), crate::generate_id(), "echo");
        function.record_execution(2.0, 10.0);
        function.record_execution(4.0, 6.0);
        assert_eq!(function.counter, 2);
        assert_eq!(function.min_exec_time, 6.0);
        assert_eq!(function.max_exec_time, 10.0);
        assert_eq!(function.avg_wait_time, 3.0);
        assert_eq!(function.avg_exec_time, 8.0);
    }
}
