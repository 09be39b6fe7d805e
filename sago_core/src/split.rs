//! Write-conflict splitting for waves.
//!
//! The dependency graph only captures reads of another task's primary file.
//! Two otherwise independent tasks can still share a primary file; this pass
//! moves the later one into an overflow wave right after the current one.
//! Only primary files are treated as writes.

use crate::wave::Wave;
use std::collections::HashSet;

/// Splits waves so no two tasks in one wave share a primary file.
pub struct WaveConflictSplitter;

impl WaveConflictSplitter {
    /// Returns waves where every primary file is claimed at most once per
    /// wave. Overflow is split again until it is conflict-free, so `n` tasks
    /// sharing a primary file end up in `n` consecutive waves.
    pub fn split(waves: Vec<Wave>) -> Vec<Wave> {
        let mut result = Vec::with_capacity(waves.len());

        for wave in waves {
            let mut remaining = wave.into_tasks();

            while !remaining.is_empty() {
                let mut claimed: HashSet<String> = HashSet::new();
                let mut safe = Vec::new();
                let mut overflow = Vec::new();

                for task in remaining {
                    match task.primary_file().map(str::to_string) {
                        Some(primary) if claimed.contains(&primary) => {
                            tracing::warn!(
                                "Task {} writes to {} which another task in this wave also writes, moving to next wave",
                                task.id,
                                primary
                            );
                            overflow.push(task);
                        }
                        Some(primary) => {
                            claimed.insert(primary);
                            safe.push(task);
                        }
                        None => safe.push(task),
                    }
                }

                result.push(Wave::new(safe));
                remaining = overflow;
            }
        }

        result
    }
}
