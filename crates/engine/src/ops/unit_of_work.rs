use std::{fmt, future::Future, ops::Deref, sync::Arc};

use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};

use crate::{EngineError, ResultEngine};

/// Shared handle on an open database transaction.
///
/// Repository functions accept it through `Deref` (`&*tx` or [`TxHandle::conn`]).
/// Clones must not outlive the closure given to
/// [`UnitOfWork::run_in_transaction`]; the transaction can only be committed
/// once every clone is gone.
#[derive(Clone)]
pub struct TxHandle(Arc<DatabaseTransaction>);

impl TxHandle {
    pub fn conn(&self) -> &DatabaseTransaction {
        &self.0
    }
}

impl Deref for TxHandle {
    type Target = DatabaseTransaction;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TxHandle").finish()
    }
}

/// Scopes a sequence of repository calls so they commit or roll back
/// together.
#[derive(Clone, Debug)]
pub struct UnitOfWork {
    database: DatabaseConnection,
}

impl UnitOfWork {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    /// Runs `f` inside a transaction.
    ///
    /// With an `ambient` handle `f` joins that transaction and nothing is
    /// committed here; the owner of the ambient transaction decides.
    /// Otherwise a new transaction is opened, committed when `f` returns
    /// `Ok` and rolled back when it returns `Err`. The error of `f` is
    /// returned unchanged.
    pub async fn run_in_transaction<T, F, Fut>(
        &self,
        ambient: Option<&TxHandle>,
        f: F,
    ) -> ResultEngine<T>
    where
        F: FnOnce(TxHandle) -> Fut,
        Fut: Future<Output = ResultEngine<T>>,
    {
        if let Some(tx) = ambient {
            return f(tx.clone()).await;
        }

        let handle = TxHandle(Arc::new(self.database.begin().await?));
        let result = f(handle.clone()).await;

        let tx = Arc::try_unwrap(handle.0).map_err(|_| {
            EngineError::TransactionFailure(
                "transaction handle outlived its unit of work".to_string(),
            )
        })?;
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}
