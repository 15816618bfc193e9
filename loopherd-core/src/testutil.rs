//! Shared fakes for the coordinator tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};

use serde_json::Value;

use crate::error::Result;
use crate::ingest::FetchTool;
use crate::model::LoopRecord;
use crate::player::ipc::PlayerControl;
use crate::player::proc::{ProcStatus, ProcessControl};

#[derive(Default)]
pub(crate) struct FakeProcs {
    next_pid: AtomicI32,
    statuses: Mutex<HashMap<i32, ProcStatus>>,
    spawned: Mutex<Vec<String>>,
    despawned: Mutex<Vec<i32>>,
}

impl FakeProcs {
    pub(crate) fn with_status(pid: i32, status: ProcStatus) -> Self {
        let fake = Self::default();
        fake.statuses.lock().unwrap().insert(pid, status);
        fake
    }

    pub(crate) fn spawned(&self) -> Vec<String> {
        self.spawned.lock().unwrap().clone()
    }

    pub(crate) fn despawned(&self) -> Vec<i32> {
        self.despawned.lock().unwrap().clone()
    }
}

impl ProcessControl for FakeProcs {
    fn spawn(&self, loop_id: &str, _media: &Path, _record: &LoopRecord) -> Result<i32> {
        self.spawned.lock().unwrap().push(loop_id.to_string());
        // Well clear of any pid a test seeds by hand.
        let pid = 100 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.statuses.lock().unwrap().insert(pid, ProcStatus::Running);
        Ok(pid)
    }

    fn status(&self, pid: i32) -> ProcStatus {
        self.statuses
            .lock()
            .unwrap()
            .get(&pid)
            .copied()
            .unwrap_or(ProcStatus::Gone)
    }

    fn despawn(&self, pid: i32) {
        self.despawned.lock().unwrap().push(pid);
        self.statuses.lock().unwrap().insert(pid, ProcStatus::Gone);
    }
}

#[derive(Default)]
pub(crate) struct FakePlayers {
    props: HashMap<(String, String), Value>,
    sets: Mutex<Vec<(String, String, Value)>>,
    seeks: Mutex<Vec<(String, f64)>>,
}

impl FakePlayers {
    pub(crate) fn with_props(props: &[(&str, &str, Value)]) -> Self {
        Self {
            props: props
                .iter()
                .map(|(l, p, v)| ((l.to_string(), p.to_string()), v.clone()))
                .collect(),
            ..Self::default()
        }
    }

    pub(crate) fn sets(&self) -> Vec<(String, String, Value)> {
        self.sets.lock().unwrap().clone()
    }

    pub(crate) fn seeks(&self) -> Vec<(String, f64)> {
        self.seeks.lock().unwrap().clone()
    }
}

impl PlayerControl for FakePlayers {
    async fn get_property(&self, loop_id: &str, name: &str) -> Option<Value> {
        self.props
            .get(&(loop_id.to_string(), name.to_string()))
            .cloned()
    }

    async fn set_property(&self, loop_id: &str, name: &str, value: Value) -> Option<Value> {
        self.sets
            .lock()
            .unwrap()
            .push((loop_id.to_string(), name.to_string(), value));
        Some(Value::Null)
    }

    async fn seek_absolute(&self, loop_id: &str, seconds: f64) -> Option<Value> {
        self.seeks.lock().unwrap().push((loop_id.to_string(), seconds));
        Some(Value::Null)
    }
}

/// Names downloads after the URL's last path segment.
#[derive(Default)]
pub(crate) struct FakeFetch {
    downloads: Mutex<Vec<(String, PathBuf)>>,
}

impl FakeFetch {
    pub(crate) fn downloads(&self) -> Vec<(String, PathBuf)> {
        self.downloads.lock().unwrap().clone()
    }
}

impl FetchTool for FakeFetch {
    async fn resolve_filename(&self, url: &str) -> Result<String> {
        let name = url.rsplit('/').next().unwrap_or("download");
        Ok(format!("{name}.mp4"))
    }

    async fn start_download(&self, url: &str, dest: &Path) -> Result<()> {
        self.downloads
            .lock()
            .unwrap()
            .push((url.to_string(), dest.to_path_buf()));
        Ok(())
    }
}
