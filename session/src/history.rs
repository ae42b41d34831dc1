use crate::session::SessionError;
use arbor_core::{StateLog, Tree};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;

pub type GenerationId = u64;

/// One point in time a session can be rolled back to: the snapshot log
/// captured after one request.
pub struct Generation {
    pub id: GenerationId,
    pub captured_at: DateTime<Utc>,
    log: StateLog,
}

impl Generation {
    pub fn log(&self) -> &StateLog {
        &self.log
    }
}

/// A bounded, ordered record of a session's snapshot generations.
pub struct History {
    generations: VecDeque<Generation>,
    next_id: GenerationId,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            generations: VecDeque::new(),
            next_id: 0,
            limit: limit.max(1),
        }
    }

    pub fn record(&mut self, log: StateLog) -> GenerationId {
        let id = self.next_id;
        self.next_id += 1;
        self.generations.push_back(Generation {
            id,
            captured_at: Utc::now(),
            log,
        });
        while self.generations.len() > self.limit {
            self.generations.pop_front();
        }
        id
    }

    pub fn latest(&self) -> Option<GenerationId> {
        self.generations.back().map(|g| g.id)
    }

    pub fn contains(&self, id: GenerationId) -> bool {
        self.generations.iter().any(|g| g.id == id)
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    /// Roll the tree back to the state captured at `target`.
    ///
    /// Generations are replayed newest first down to the target, each log in
    /// reverse entry order, so the target's values are applied last and win.
    /// The newer generations are then discarded: the rewound point starts a
    /// fresh timeline.
    pub fn rewind(&mut self, tree: &mut Tree, target: GenerationId) -> Result<(), SessionError> {
        if !self.contains(target) {
            return Err(SessionError::UnknownGeneration(target));
        }
        for generation in self.generations.iter().rev() {
            if generation.id < target {
                break;
            }
            generation.log.replay(tree)?;
        }
        while self.generations.back().is_some_and(|g| g.id > target) {
            self.generations.pop_back();
        }
        debug!(generation = target, "rewound");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{
        BacktrackScope, Component, CoreError, CoreResult, RenderCtx, Saved, capture, restore_as,
    };

    struct Cell {
        value: i64,
    }

    impl Component for Cell {
        fn render(&self, _ctx: &mut RenderCtx<'_, '_>) -> CoreResult<()> {
            Ok(())
        }

        fn backtrack_state(&self, scope: &mut BacktrackScope<'_>) {
            scope.save("value", self.value);
        }

        fn restore_state(&mut self, field: &str, value: &dyn Saved) -> CoreResult<()> {
            match field {
                "value" => {
                    self.value = restore_as(field, value)?;
                    Ok(())
                }
                other => Err(CoreError::Restore {
                    field: other.to_string(),
                    reason: "unknown field".to_string(),
                }),
            }
        }
    }

    #[test]
    fn test_rewind_restores_earlier_generation() {
        let mut tree = Tree::new();
        let root = tree.mount(Cell { value: 1 });
        let mut history = History::new(8);

        let first = history.record(capture(&mut tree, root).unwrap());
        tree.get_mut::<Cell>(root).unwrap().value = 2;
        let second = history.record(capture(&mut tree, root).unwrap());
        tree.get_mut::<Cell>(root).unwrap().value = 3;

        history.rewind(&mut tree, first).unwrap();
        assert_eq!(tree.get::<Cell>(root).unwrap().value, 1);
        // The newer generation was discarded with its timeline.
        assert!(!history.contains(second));
        assert_eq!(history.latest(), Some(first));
    }

    #[test]
    fn test_rewind_to_evicted_generation_fails() {
        let mut tree = Tree::new();
        let root = tree.mount(Cell { value: 0 });
        let mut history = History::new(2);

        let first = history.record(capture(&mut tree, root).unwrap());
        history.record(capture(&mut tree, root).unwrap());
        history.record(capture(&mut tree, root).unwrap());

        assert!(matches!(
            history.rewind(&mut tree, first),
            Err(SessionError::UnknownGeneration(_))
        ));
    }
}
