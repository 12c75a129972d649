use crate::simulation::session::TradingSession;
use anyhow::Result;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

pub type SessionStoreRef = Arc<SessionStore>;

/// All per-user trading sessions in one JSON file. Every read-modify-write holds the same lock.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SessionStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub async fn load(&self, user_id: i32) -> Result<Option<TradingSession>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(&user_id))
    }

    pub async fn save(&self, session: &TradingSession) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut sessions = self.read_all().await?;
        sessions.insert(session.user_id, session.clone());
        self.write_all(&sessions).await
    }

    pub async fn remove(&self, user_id: i32) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut sessions = self.read_all().await?;
        if sessions.remove(&user_id).is_some() {
            self.write_all(&sessions).await?;
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<HashMap<i32, TradingSession>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(sessions) => Ok(sessions),
                Err(e) => {
                    warn!("Session file {:?} is unreadable, starting empty: {e}", self.path);
                    Ok(HashMap::new())
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, sessions: &HashMap<i32, TradingSession>) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(sessions)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::session::ScheduleConfig;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    fn temp_store() -> SessionStore {
        SessionStore::new(std::env::temp_dir().join(format!("sessions-{}.json", Uuid::new_v4())))
    }

    fn session(user_id: i32) -> TradingSession {
        let now = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        TradingSession::new(&mut rng, user_id, 3.0, now, &ScheduleConfig::default())
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let store = temp_store();
        assert!(store.load(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sessions_survive_a_new_store() {
        let store = temp_store();
        let mut first = session(1);
        first.record_trade(0.2);
        store.save(&first).await.unwrap();
        store.save(&session(2)).await.unwrap();

        let reopened = SessionStore::new(store.path.clone());
        assert_eq!(reopened.load(1).await.unwrap(), Some(first));
        assert!(reopened.load(2).await.unwrap().is_some());

        reopened.remove(2).await.unwrap();
        assert!(store.load(2).await.unwrap().is_none());
        let _ = std::fs::remove_file(&store.path);
    }

    #[tokio::test]
    async fn test_concurrent_saves_keep_every_user() {
        let store = Arc::new(temp_store());
        let handles: Vec<_> = (1..=8)
            .map(|user_id| {
                let store = store.clone();
                tokio::spawn(async move { store.save(&session(user_id)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        for user_id in 1..=8 {
            assert!(store.load(user_id).await.unwrap().is_some());
        }
        let _ = std::fs::remove_file(&store.path);
    }
}
