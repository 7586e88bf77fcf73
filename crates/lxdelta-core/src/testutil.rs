use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use tar::{EntryType, Header};

use crate::archive::for_each_member;
use crate::error::{LxdeltaError, Result};
use crate::runtime::{Container, ContainerRuntime, ContainerState};

/// One member of a fixture archive.
#[derive(Debug, Clone)]
pub enum TestMember {
    File { path: String, data: Vec<u8> },
    Dir { path: String },
    Symlink { path: String, target: String },
}

impl TestMember {
    pub fn file(path: &str, data: impl AsRef<[u8]>) -> Self {
        TestMember::File {
            path: path.to_string(),
            data: data.as_ref().to_vec(),
        }
    }

    pub fn dir(path: &str) -> Self {
        TestMember::Dir {
            path: path.to_string(),
        }
    }

    pub fn symlink(path: &str, target: &str) -> Self {
        TestMember::Symlink {
            path: path.to_string(),
            target: target.to_string(),
        }
    }
}

/// Build an uncompressed tar stream. Long names use GNU extension entries.
pub fn tar_bytes(members: &[TestMember]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for member in members {
        let mut header = Header::new_gnu();
        header.set_mtime(1_700_000_000);
        header.set_uid(1000);
        header.set_gid(1000);
        match member {
            TestMember::File { path, data } => {
                header.set_entry_type(EntryType::Regular);
                header.set_mode(0o644);
                header.set_size(data.len() as u64);
                builder.append_data(&mut header, path, &data[..]).unwrap();
            }
            TestMember::Dir { path } => {
                header.set_entry_type(EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                builder.append_data(&mut header, path, std::io::empty()).unwrap();
            }
            TestMember::Symlink { path, target } => {
                header.set_entry_type(EntryType::Symlink);
                header.set_mode(0o777);
                header.set_size(0);
                builder.append_link(&mut header, path, target).unwrap();
            }
        }
    }
    builder.into_inner().unwrap()
}

pub fn compress(data: &[u8]) -> Vec<u8> {
    zstd::stream::encode_all(data, 3).unwrap()
}

/// Compressed fixture archive, the same shape a container export has.
pub fn archive_bytes(members: &[TestMember]) -> Vec<u8> {
    compress(&tar_bytes(members))
}

pub fn write_archive(path: &Path, members: &[TestMember]) {
    std::fs::write(path, archive_bytes(members)).unwrap();
}

/// What a test sees of one archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadMember {
    pub path: String,
    pub kind: EntryType,
    pub data: Vec<u8>,
    pub link: Option<String>,
}

pub fn read_members(path: &Path) -> Vec<ReadMember> {
    let file = std::fs::File::open(path).unwrap();
    let mut out = Vec::new();
    for_each_member(file, "test", |entry, member_path| {
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        out.push(ReadMember {
            path: member_path.to_string(),
            kind: entry.header().entry_type(),
            data,
            link: entry
                .link_name_bytes()
                .map(|l| String::from_utf8_lossy(&l).into_owned()),
        });
        Ok(())
    })
    .unwrap();
    out
}

pub fn member_paths(path: &Path) -> Vec<String> {
    read_members(path).into_iter().map(|m| m.path).collect()
}

pub fn datetime(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(3, 0, 0)
        .unwrap()
}

pub fn container(name: &str, state: ContainerState) -> Container {
    Container {
        name: name.to_string(),
        host: String::new(),
        state,
        profile_name: "default".to_string(),
        profile: format!("config: {{}}\ndescription: {name}\n"),
    }
}

/// In-memory [`ContainerRuntime`]: exports write whatever member list the
/// test registered for the container, and every call is recorded.
#[derive(Default)]
pub struct MockRuntime {
    containers: Vec<Container>,
    exports: RefCell<HashMap<String, Vec<TestMember>>>,
    failing_exports: RefCell<HashSet<String>>,
    failing_starts: RefCell<HashSet<String>>,
    calls: RefCell<Vec<String>>,
}

impl MockRuntime {
    pub fn new(containers: Vec<Container>) -> Self {
        Self {
            containers,
            ..Default::default()
        }
    }

    pub fn set_export(&self, name: &str, members: Vec<TestMember>) {
        self.exports.borrow_mut().insert(name.to_string(), members);
    }

    pub fn fail_export(&self, name: &str) {
        self.failing_exports.borrow_mut().insert(name.to_string());
    }

    pub fn fail_start(&self, name: &str) {
        self.failing_starts.borrow_mut().insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl ContainerRuntime for MockRuntime {
    fn list(&self) -> Result<Vec<Container>> {
        self.record("list".into());
        Ok(self.containers.clone())
    }

    fn stop(&self, name: &str) -> Result<()> {
        self.record(format!("stop {name}"));
        Ok(())
    }

    fn start(&self, name: &str) -> Result<()> {
        self.record(format!("start {name}"));
        if self.failing_starts.borrow().contains(name) {
            return Err(LxdeltaError::Runtime(format!("cannot start {name}")));
        }
        Ok(())
    }

    fn export(&self, name: &str, destination: &Path) -> Result<()> {
        self.record(format!("export {name}"));
        if self.failing_exports.borrow().contains(name) {
            // leave a partial file behind like an interrupted export would
            let mut f = std::fs::File::create(destination)?;
            f.write_all(b"\x28\xb5\x2f\xfd partial")?;
            return Err(LxdeltaError::Runtime(format!("export of {name} failed")));
        }
        let members = self
            .exports
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_default();
        write_archive(destination, &members);
        Ok(())
    }
}
