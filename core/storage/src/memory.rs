//! In-memory file provider for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use tracing::debug;

use fsgate_common::{resolve, Access, Acl, Content, Data, DataType, Error, File, Result};

use crate::provider::{FileProvider, Response};
use crate::request::{AclMap, DuplicatePolicy, FileRequest, Method};

/// In-memory storage entry.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Data, file: File },
    Directory { file: File },
}

impl Entry {
    fn file(&self) -> &File {
        match self {
            Entry::File { file, .. } | Entry::Directory { file } => file,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory { .. })
    }
}

#[derive(Default)]
struct Store {
    entries: HashMap<String, Entry>,
    acls: HashMap<String, AclMap>,
}

/// In-memory file provider.
///
/// Supports every method, including ACLs. All data is stored in memory
/// and lost on drop. Anonymous requests are accepted.
pub struct MemoryProvider {
    name: String,
    store: Arc<RwLock<Store>>,
}

impl MemoryProvider {
    /// Create a new empty memory provider named "memory".
    pub fn new() -> Self {
        Self::with_name("memory")
    }

    /// Create a new empty memory provider reporting `name` on its files.
    pub fn with_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut store = Store::default();
        let root = File::new("/").directory().with_provider(name.clone());
        store
            .entries
            .insert("/".to_string(), Entry::Directory { file: root });

        Self {
            name,
            store: Arc::new(RwLock::new(store)),
        }
    }

    fn store(&self) -> RwLockWriteGuard<'_, Store> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_file(&self, path: &str) -> File {
        File::new(path).with_provider(self.name.clone())
    }

    fn require_parent_dir(store: &Store, file: &File) -> Result<()> {
        match store.entries.get(&Self::dir_key(&file.parent_path)) {
            Some(Entry::Directory { .. }) => Ok(()),
            Some(Entry::File { .. }) => Err(Error::InvalidInput(format!(
                "Parent is a file: {}",
                file.parent_path
            ))),
            None => Err(Error::NotFound(format!(
                "Parent directory not found: {}",
                file.parent_path
            ))),
        }
    }

    /// Parent paths end with `/`; entries are keyed by canonical path.
    fn dir_key(parent_path: &str) -> String {
        resolve(parent_path).path
    }

    /// First free `name (n).ext` sibling of `path`.
    fn free_name(store: &Store, path: &str) -> String {
        let info = resolve(path);
        let name = info.name.unwrap_or_default();
        let extension = info.extension.unwrap_or_default();
        (1..)
            .map(|n| format!("{}{} ({}){}", info.parent_path, name, n, extension))
            .find(|candidate| !store.entries.contains_key(candidate))
            .unwrap_or_else(|| path.to_string())
    }

    fn convert(data: &Data, data_type: DataType) -> Result<Data> {
        let converted = match (data_type, &data.content) {
            (DataType::Text, Content::Text(_))
            | (DataType::Blob, Content::Binary(_))
            | (DataType::Json, Content::Json(_))
            | (DataType::Unknown, _) => return Ok(data.clone()),
            (DataType::Text, content) => {
                Data::new(String::from_utf8_lossy(&content.to_bytes()).into_owned())
            }
            (DataType::Blob, content) => Data::new(content.to_bytes()),
            (DataType::Json, content) => {
                let value: serde_json::Value = serde_json::from_slice(&content.to_bytes())?;
                Data::new(Content::Json(value))
            }
        };
        Ok(converted)
    }

    fn read(&self, request: &FileRequest) -> Result<File> {
        let path = resolve(&request.path).path;
        let store = self.store();
        match store.entries.get(&path) {
            Some(Entry::File { data, file }) => Ok(file
                .clone()
                .with_data(Self::convert(data, request.data_type)?)),
            Some(Entry::Directory { .. }) => Err(Error::InvalidInput(format!(
                "Cannot read directory: {}",
                path
            ))),
            None => Err(Error::NotFound(format!("File not found: {}", path))),
        }
    }

    fn write(&self, request: &FileRequest) -> Result<File> {
        let data = request
            .data
            .clone()
            .ok_or_else(|| Error::InvalidInput("Write request carries no data".to_string()))?;

        let mut store = self.store();
        let mut path = resolve(&request.path).path;
        let mut created = Utc::now();

        let existing = store.entries.get(&path).map(|entry| match entry {
            Entry::File { file, .. } => Some(file.create_time),
            Entry::Directory { .. } => None,
        });
        match existing {
            Some(None) => {
                return Err(Error::AlreadyExists(format!(
                    "Directory exists at path: {}",
                    path
                )));
            }
            Some(Some(create_time)) => match request.duplicate_policy {
                DuplicatePolicy::Fail => {
                    return Err(Error::AlreadyExists(format!("File already exists: {}", path)));
                }
                DuplicatePolicy::Overwrite => created = create_time,
                DuplicatePolicy::Rename => path = Self::free_name(&store, &path),
            },
            None => {}
        }

        let mut file = self.new_file(&path).with_size(data.content.to_bytes().len() as u64);
        Self::require_parent_dir(&store, &file)?;
        file.create_time = created;

        debug!("memory: wrote {} ({} bytes)", path, file.size);
        store.entries.insert(
            path,
            Entry::File {
                data: data.clone(),
                file: file.clone(),
            },
        );

        Ok(file.with_data(data))
    }

    fn list(&self, request: &FileRequest) -> Result<Vec<File>> {
        let path = resolve(&request.path).path;
        let store = self.store();

        match store.entries.get(&path) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(Error::InvalidInput(format!("Not a directory: {}", path)));
            }
            None => return Err(Error::NotFound(format!("Directory not found: {}", path))),
        }

        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };

        let mut files: Vec<File> = store
            .entries
            .iter()
            .filter(|(key, entry)| *key != &path && entry.file().parent_path == prefix)
            .map(|(_, entry)| entry.file().clone())
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    fn move_entry(&self, request: &FileRequest) -> Result<File> {
        let from = resolve(&request.path).path;
        let to = request
            .new_path
            .as_deref()
            .map(|p| resolve(p).path)
            .ok_or_else(|| Error::InvalidInput("Move request carries no new path".to_string()))?;

        if from == "/" {
            return Err(Error::InvalidInput("Cannot move the root directory".to_string()));
        }
        if to == from || to.starts_with(&format!("{}/", from)) {
            return Err(Error::InvalidInput(format!(
                "Cannot move {} into itself",
                from
            )));
        }

        let mut store = self.store();
        if !store.entries.contains_key(&from) {
            return Err(Error::NotFound(format!("Path not found: {}", from)));
        }

        let mut to = to;
        let existing_is_dir = store.entries.get(&to).map(Entry::is_dir);
        if let Some(is_dir) = existing_is_dir {
            match request.duplicate_policy {
                DuplicatePolicy::Fail => {
                    return Err(Error::AlreadyExists(format!(
                        "Destination already exists: {}",
                        to
                    )));
                }
                DuplicatePolicy::Overwrite if is_dir => {
                    return Err(Error::AlreadyExists(format!(
                        "Cannot overwrite directory: {}",
                        to
                    )));
                }
                DuplicatePolicy::Overwrite => {
                    store.entries.remove(&to);
                }
                DuplicatePolicy::Rename => to = Self::free_name(&store, &to),
            }
        }
        Self::require_parent_dir(&store, &self.new_file(&to))?;

        let descendants_prefix = format!("{}/", from);
        let keys: Vec<String> = store
            .entries
            .keys()
            .filter(|key| **key == from || key.starts_with(&descendants_prefix))
            .cloned()
            .collect();

        for key in keys {
            let new_key = format!("{}{}", to, &key[from.len()..]);
            if let Some(entry) = store.entries.remove(&key) {
                let moved = Self::relocate(entry, self.new_file(&new_key));
                store.entries.insert(new_key.clone(), moved);
            }
            if let Some(acl) = store.acls.remove(&key) {
                store.acls.insert(new_key, acl);
            }
        }

        debug!("memory: moved {} -> {}", from, to);
        store
            .entries
            .get(&to)
            .map(|entry| entry.file().clone())
            .ok_or_else(|| Error::NotFound(format!("Path not found after move: {}", to)))
    }

    fn relocate(entry: Entry, target: File) -> Entry {
        let rebuild = |old: File| File {
            is_dir: old.is_dir,
            size: old.size,
            create_time: old.create_time,
            modify_time: Utc::now(),
            ..target
        };
        match entry {
            Entry::File { data, file } => Entry::File {
                data,
                file: rebuild(file),
            },
            Entry::Directory { file } => Entry::Directory {
                file: rebuild(file),
            },
        }
    }

    fn delete(&self, request: &FileRequest) -> Result<File> {
        let path = resolve(&request.path).path;
        if path == "/" {
            return Err(Error::InvalidInput("Cannot delete the root directory".to_string()));
        }

        let mut store = self.store();
        let removed = store
            .entries
            .remove(&path)
            .ok_or_else(|| Error::NotFound(format!("Path not found: {}", path)))?;

        let prefix = format!("{}/", path);
        store.entries.retain(|key, _| !key.starts_with(&prefix));
        store
            .acls
            .retain(|key, _| key != &path && !key.starts_with(&prefix));

        debug!("memory: deleted {}", path);
        Ok(removed.file().clone())
    }

    fn mkdir(&self, request: &FileRequest) -> Result<File> {
        let target = resolve(&request.path);
        let mut store = self.store();

        if store.entries.contains_key(&target.path) {
            return Err(Error::AlreadyExists(format!(
                "Path already exists: {}",
                target.path
            )));
        }

        // Create missing ancestors first.
        let mut current = String::new();
        for segment in target.path.split('/').filter(|s| !s.is_empty()) {
            current = format!("{}/{}", current, segment);
            match store.entries.get(&current) {
                Some(Entry::Directory { .. }) => continue,
                Some(Entry::File { .. }) => {
                    return Err(Error::InvalidInput(format!(
                        "Path component is a file: {}",
                        current
                    )));
                }
                None => {
                    let file = self.new_file(&current).directory();
                    store
                        .entries
                        .insert(current.clone(), Entry::Directory { file });
                }
            }
        }

        debug!("memory: created directory {}", target.path);
        store
            .entries
            .get(&target.path)
            .map(|entry| entry.file().clone())
            .ok_or_else(|| Error::NotFound(target.path.clone()))
    }

    fn acl_list(store: &Store, path: &str) -> Result<Vec<Acl>> {
        let file = store
            .entries
            .get(path)
            .map(|entry| entry.file().clone())
            .ok_or_else(|| Error::NotFound(format!("Path not found: {}", path)))?;

        Ok(store
            .acls
            .get(path)
            .map(|acl| {
                acl.iter()
                    .map(|(user, access)| Acl::new(user.clone(), file.clone(), *access))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn read_acl(&self, request: &FileRequest) -> Result<Vec<Acl>> {
        let path = resolve(&request.path).path;
        Self::acl_list(&self.store(), &path)
    }

    fn write_acl(&self, request: &FileRequest) -> Result<Vec<Acl>> {
        let path = resolve(&request.path).path;
        let changes = request
            .acl
            .as_ref()
            .ok_or_else(|| Error::InvalidInput("writeAcl request carries no acl".to_string()))?;

        let mut store = self.store();
        if !store.entries.contains_key(&path) {
            return Err(Error::NotFound(format!("Path not found: {}", path)));
        }

        let acl = store.acls.entry(path.clone()).or_default();
        for (user, access) in changes {
            if access.is_empty() {
                acl.remove(user);
            } else {
                acl.insert(user.clone(), *access);
            }
        }

        Self::acl_list(&store, &path)
    }

    /// Rights granted to `user` on `path`, `Access::NONE` when unset.
    pub fn access_of(&self, path: &str, user: &str) -> Access {
        let path = resolve(path).path;
        self.store()
            .acls
            .get(&path)
            .and_then(|acl| acl.get(user).copied())
            .unwrap_or(Access::NONE)
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileProvider for MemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, request: FileRequest) -> Result<Response> {
        debug!("memory: {} {}", request.method, request.path);
        match request.method {
            Method::Read => self.read(&request).map(Response::File),
            Method::Write => self.write(&request).map(Response::File),
            Method::List => self.list(&request).map(Response::Files),
            Method::Move => self.move_entry(&request).map(Response::File),
            Method::Delete => self.delete(&request).map(Response::File),
            Method::Mkdir => self.mkdir(&request).map(Response::File),
            Method::ReadAcl => self.read_acl(&request).map(Response::Acl),
            Method::WriteAcl => self.write_acl(&request).map(Response::Acl),
        }
    }
}
