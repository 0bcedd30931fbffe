use std::{future::Future, sync::Arc};

use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinSet},
};

use crate::error::Result;

/// A join set that runs at most `limit` tasks at a time. Spawning waits
/// for a running task to finish once the limit is reached.
pub struct BoundedJoinSet<T> {
    semaphore: Arc<Semaphore>,
    join_set: JoinSet<T>,
}

impl<T: Send + 'static> BoundedJoinSet<T> {
    pub fn new(limit: usize) -> Self {
        BoundedJoinSet {
            semaphore: Arc::new(Semaphore::new(limit.max(1))),
            join_set: JoinSet::new(),
        }
    }

    pub async fn spawn<F>(&mut self, task: F) -> Result<()>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let permit = self.semaphore.clone().acquire_owned().await?;
        self.join_set.spawn(async move {
            let value = task.await;
            drop(permit);
            value
        });
        Ok(())
    }

    /// Waits for the next task to finish, in completion order.
    pub async fn join_next(&mut self) -> Option<std::result::Result<T, JoinError>> {
        self.join_set.join_next().await
    }
}
