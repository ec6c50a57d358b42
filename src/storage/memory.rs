//! In-process container store for lifecycle tests
//!
//! Containers get a real directory under a scratch root so tests can write
//! files into mounted caches; change sets are computed by comparing that
//! directory against the files of the base image.

use super::{BuilderOptions, Change, ChangeKind, CommitOutput, ContainerStore, WorkingContainer};
use crate::cache::image::{ImageReference, SCRATCH};
use crate::error::{LayerCacheError, LayerCacheResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

type Files = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone)]
struct Image {
    id: String,
    files: Files,
}

#[derive(Debug)]
struct Entry {
    container: WorkingContainer,
    base: Files,
    dir: PathBuf,
    mounted: bool,
}

#[derive(Debug, Default)]
struct State {
    images: HashMap<String, Image>,
    containers: HashMap<String, Entry>,
    next_id: u64,
    pushes: Vec<(String, String)>,
    deleted: Vec<String>,
    create_calls: Vec<BuilderOptions>,
}

/// Failure injection switches
#[derive(Debug, Default, Clone)]
pub struct Faults {
    pub create: bool,
    pub save: bool,
    pub commit: bool,
    pub push: bool,
    pub unmount: bool,
    pub delete: bool,
}

#[derive(Debug)]
pub struct MemoryStore {
    root: PathBuf,
    state: Mutex<State>,
    pub faults: Mutex<Faults>,
}

impl MemoryStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            state: Mutex::new(State::default()),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Seed an image under `name` (a normalised docker reference)
    pub fn add_image(&self, name: &str, files: &[(&str, &str)]) -> String {
        let mut state = self.state.lock().unwrap();
        let id = next_id(&mut state, "img");
        let files = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.as_bytes().to_vec()))
            .collect();
        state.images.insert(
            name.to_string(),
            Image {
                id: id.clone(),
                files,
            },
        );
        id
    }

    pub fn image_id(&self, name: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.images.get(name).map(|image| image.id.clone())
    }

    pub fn pushes(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().pushes.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn create_calls(&self) -> Vec<BuilderOptions> {
        self.state.lock().unwrap().create_calls.clone()
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    pub fn is_mounted(&self, name: &str) -> bool {
        let state = self.state.lock().unwrap();
        state
            .containers
            .values()
            .any(|e| e.container.name == name && e.mounted)
    }

    fn faults(&self) -> Faults {
        self.faults.lock().unwrap().clone()
    }
}

fn next_id(state: &mut State, prefix: &str) -> String {
    state.next_id += 1;
    format!("{}{:060}", prefix, state.next_id)
}

fn injected(step: &str) -> LayerCacheError {
    LayerCacheError::command_exec(format!("memory {}", step), "injected failure")
}

fn io(context: &str, e: std::io::Error) -> LayerCacheError {
    LayerCacheError::io(context.to_string(), e)
}

fn write_files(dir: &Path, files: &Files) -> LayerCacheResult<()> {
    for (path, content) in files {
        let target = dir.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| io("creating layer dir", e))?;
        }
        fs::write(&target, content).map_err(|e| io("writing layer file", e))?;
    }
    Ok(())
}

fn read_files(dir: &Path) -> LayerCacheResult<Files> {
    fn walk(root: &Path, dir: &Path, out: &mut Files) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(root, &path, out)?;
            } else {
                let rel = path
                    .strip_prefix(root)
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default();
                out.insert(rel, fs::read(&path)?);
            }
        }
        Ok(())
    }

    let mut files = Files::new();
    if dir.exists() {
        walk(dir, dir, &mut files).map_err(|e| io("reading layer", e))?;
    }
    Ok(files)
}

#[async_trait]
impl ContainerStore for MemoryStore {
    async fn create(&self, options: &BuilderOptions) -> LayerCacheResult<WorkingContainer> {
        let faults = self.faults();
        let mut state = self.state.lock().unwrap();
        state.create_calls.push(options.clone());
        if faults.create {
            return Err(injected("create"));
        }

        let (from_image_id, base) = if options.from_image == SCRATCH {
            (None, Files::new())
        } else {
            let image = state
                .images
                .get(&options.from_image)
                .ok_or_else(|| LayerCacheError::not_found("image", &options.from_image))?;
            (Some(image.id.clone()), image.files.clone())
        };

        if !options.container.is_empty()
            && state
                .containers
                .values()
                .any(|e| e.container.name == options.container)
        {
            return Err(LayerCacheError::command_exec(
                "memory create",
                format!("the container name {:?} is already in use", options.container),
            ));
        }

        let id = next_id(&mut state, "ctr");
        let name = if options.container.is_empty() {
            format!("working-container-{}", state.next_id)
        } else {
            options.container.clone()
        };
        let dir = self.root.join("containers").join(&id);
        fs::create_dir_all(&dir).map_err(|e| io("creating container dir", e))?;
        write_files(&dir, &base)?;

        let container = WorkingContainer {
            id: id.clone(),
            name,
            from_image_id,
            mount_label: Some("system_u:object_r:container_file_t:s0".to_string()),
            mount_point: None,
            args: HashMap::new(),
        };
        state.containers.insert(
            id,
            Entry {
                container: container.clone(),
                base,
                dir,
                mounted: false,
            },
        );
        Ok(container)
    }

    async fn open(&self, name: &str) -> LayerCacheResult<WorkingContainer> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .values()
            .find(|e| e.container.name == name || e.container.id == name)
            .map(|e| e.container.clone())
            .ok_or_else(|| LayerCacheError::not_found("container", name))
    }

    async fn open_by_path(&self, path: &Path) -> LayerCacheResult<WorkingContainer> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .values()
            .find(|e| {
                e.container.arg("MOUNT_DIR").map(Path::new) == Some(path)
                    || e.container.mount_point.as_deref() == Some(path)
            })
            .map(|e| e.container.clone())
            .ok_or_else(|| LayerCacheError::not_found("container", path.display().to_string()))
    }

    async fn mount(
        &self,
        container: &WorkingContainer,
        _label: Option<&str>,
    ) -> LayerCacheResult<PathBuf> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .containers
            .get_mut(&container.id)
            .ok_or_else(|| LayerCacheError::not_found("container", &container.id))?;
        entry.mounted = true;
        entry.container.mount_point = Some(entry.dir.clone());
        Ok(entry.dir.clone())
    }

    async fn unmount(&self, container: &WorkingContainer) -> LayerCacheResult<()> {
        if self.faults().unmount {
            return Err(injected("unmount"));
        }
        let mut state = self.state.lock().unwrap();
        let entry = state
            .containers
            .get_mut(&container.id)
            .ok_or_else(|| LayerCacheError::not_found("container", &container.id))?;
        entry.mounted = false;
        entry.container.mount_point = None;
        Ok(())
    }

    async fn save(&self, container: &WorkingContainer) -> LayerCacheResult<()> {
        if self.faults().save {
            return Err(injected("save"));
        }
        let mut state = self.state.lock().unwrap();
        let entry = state
            .containers
            .get_mut(&container.id)
            .ok_or_else(|| LayerCacheError::not_found("container", &container.id))?;
        entry.container.args = container.args.clone();
        Ok(())
    }

    async fn changes(&self, container: &WorkingContainer) -> LayerCacheResult<Vec<Change>> {
        let (base, dir) = {
            let state = self.state.lock().unwrap();
            let entry = state
                .containers
                .get(&container.id)
                .ok_or_else(|| LayerCacheError::not_found("container", &container.id))?;
            (entry.base.clone(), entry.dir.clone())
        };
        let current = read_files(&dir)?;

        let mut changes = Vec::new();
        for (path, content) in &current {
            match base.get(path) {
                None => changes.push(Change {
                    path: format!("/{}", path),
                    kind: ChangeKind::Added,
                }),
                Some(old) if old != content => changes.push(Change {
                    path: format!("/{}", path),
                    kind: ChangeKind::Modified,
                }),
                Some(_) => {}
            }
        }
        for path in base.keys().filter(|p| !current.contains_key(*p)) {
            changes.push(Change {
                path: format!("/{}", path),
                kind: ChangeKind::Deleted,
            });
        }
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(changes)
    }

    async fn commit(
        &self,
        container: &WorkingContainer,
        target: &ImageReference,
    ) -> LayerCacheResult<CommitOutput> {
        if self.faults().commit {
            return Err(injected("commit"));
        }
        let dir = {
            let state = self.state.lock().unwrap();
            state
                .containers
                .get(&container.id)
                .map(|e| e.dir.clone())
                .ok_or_else(|| LayerCacheError::not_found("container", &container.id))?
        };
        let files = read_files(&dir)?;

        let mut state = self.state.lock().unwrap();
        let id = next_id(&mut state, "img");
        let name = target.base_image_name();
        state.images.insert(
            name.clone(),
            Image {
                id: id.clone(),
                files,
            },
        );
        Ok(CommitOutput {
            reference: Some(format!("{}@sha256:{}", name, id)),
            image_id: id,
        })
    }

    async fn push(&self, image_id: &str, destination: &ImageReference) -> LayerCacheResult<()> {
        if self.faults().push {
            return Err(injected("push"));
        }
        let mut state = self.state.lock().unwrap();
        state
            .pushes
            .push((image_id.to_string(), destination.to_string()));
        Ok(())
    }

    async fn delete(&self, container: &WorkingContainer) -> LayerCacheResult<()> {
        if self.faults().delete {
            return Err(injected("delete"));
        }
        let mut state = self.state.lock().unwrap();
        let entry = state
            .containers
            .remove(&container.id)
            .ok_or_else(|| LayerCacheError::not_found("container", &container.id))?;
        let _ = fs::remove_dir_all(&entry.dir);
        state.deleted.push(container.id.clone());
        Ok(())
    }

    async fn prune(&self) -> LayerCacheResult<()> {
        let mut state = self.state.lock().unwrap();
        for (_, entry) in state.containers.drain() {
            let _ = fs::remove_dir_all(&entry.dir);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
