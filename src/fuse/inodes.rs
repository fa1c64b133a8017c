//! Inode allocation and path resolution for the FUSE filesystem.
//!
//! The kernel addresses files by inode while [`crate::fs::TransformFs`]
//! works on paths. Inodes are handed out sequentially the first time a path is
//! looked up and carry the kernel's lookup count. An inode is dropped once the
//! kernel forgets every lookup of it, so the table only holds paths the kernel
//! still references. The root is never dropped.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Root directory inode (standard FUSE convention).
pub const INODE_ROOT: u64 = 1;

/// Inode reported for directory entries the kernel has not looked up yet.
pub const UNKNOWN_INODE: u64 = 0xffff_ffff;

#[derive(Debug)]
struct Node {
    path: PathBuf,
    lookups: u64,
}

/// Bidirectional inode/path map.
#[derive(Debug)]
pub struct InodeTable {
    nodes: HashMap<u64, Node>,
    inodes: HashMap<PathBuf, u64>,
    next: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    /// Creates a table holding only the root.
    #[must_use]
    pub fn new() -> Self {
        let root = PathBuf::from("/");
        let mut nodes = HashMap::new();
        let mut inodes = HashMap::new();
        inodes.insert(root.clone(), INODE_ROOT);
        nodes.insert(
            INODE_ROOT,
            Node {
                path: root,
                lookups: 0,
            },
        );
        Self {
            nodes,
            inodes,
            next: INODE_ROOT + 1,
        }
    }

    /// The path of `inode`, if it was handed out.
    #[must_use]
    pub fn path(&self, inode: u64) -> Option<&Path> {
        self.nodes.get(&inode).map(|node| node.path.as_path())
    }

    /// The path of the entry `name` inside directory `parent`.
    #[must_use]
    pub fn child_path(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        self.path(parent).map(|dir| dir.join(name))
    }

    /// The inode of `path`, if the kernel currently holds one.
    #[must_use]
    pub fn inode(&self, path: &Path) -> Option<u64> {
        self.inodes.get(path).copied()
    }

    /// Records a kernel lookup of `path` and returns its inode, allocating
    /// one on first sight.
    pub fn lookup(&mut self, path: PathBuf) -> u64 {
        if let Some(&inode) = self.inodes.get(&path) {
            if let Some(node) = self.nodes.get_mut(&inode) {
                node.lookups += 1;
            }
            return inode;
        }
        let inode = self.next;
        self.next += 1;
        self.inodes.insert(path.clone(), inode);
        self.nodes.insert(inode, Node { path, lookups: 1 });
        inode
    }

    /// Drops `nlookup` lookups of `inode`, removing it when none remain.
    pub fn forget(&mut self, inode: u64, nlookup: u64) {
        if inode == INODE_ROOT {
            return;
        }
        let Some(node) = self.nodes.get_mut(&inode) else {
            return;
        };
        node.lookups = node.lookups.saturating_sub(nlookup);
        if node.lookups == 0
            && let Some(node) = self.nodes.remove(&inode)
        {
            self.inodes.remove(&node.path);
        }
    }

    /// The inode of the directory containing `inode`. The root is its own
    /// parent.
    #[must_use]
    pub fn parent(&self, inode: u64) -> u64 {
        self.path(inode)
            .and_then(Path::parent)
            .and_then(|parent| self.inode(parent))
            .unwrap_or(INODE_ROOT)
    }

    /// Number of known inodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: the root is always present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
