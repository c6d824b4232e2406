use super::feature_cache::FeatureCache;
use super::lattice::{Node, NodeId, Path, PathId};

/// Slot pool for the nodes and paths of one lattice.
///
/// Slots are never freed one by one: [`clear`](Arena::clear) invalidates every
/// handle at once and the next rebuild reuses the slots, including the
/// capacity of their adjacency lists.
#[derive(Debug, Default)]
pub struct Arena {
    pub(super) nodes: Vec<Node>,
    pub(super) num_nodes: usize,
    pub(super) paths: Vec<Path>,
    pub(super) num_paths: usize,
    /// Node table, `[x * num_labels + y]`
    pub(super) grid: Vec<NodeId>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate every node and path handed out so far
    pub fn clear(&mut self) {
        self.num_nodes = 0;
        self.num_paths = 0;
        self.grid.clear();
    }

    pub fn new_node(&mut self) -> NodeId {
        let id = NodeId::new(self.num_nodes);
        if self.num_nodes < self.nodes.len() {
            self.nodes[self.num_nodes].reset();
        } else {
            self.nodes.push(Node::default());
        }
        self.num_nodes += 1;
        id
    }

    pub fn new_path(&mut self) -> PathId {
        let id = PathId::new(self.num_paths);
        if self.num_paths < self.paths.len() {
            self.paths[self.num_paths] = Path::default();
        } else {
            self.paths.push(Path::default());
        }
        self.num_paths += 1;
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn path(&self, id: PathId) -> &Path {
        &self.paths[id.index()]
    }

    pub fn path_mut(&mut self, id: PathId) -> &mut Path {
        &mut self.paths[id.index()]
    }

    /// Live nodes since the last clear
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Live paths since the last clear
    pub fn num_paths(&self) -> usize {
        self.num_paths
    }

    /// Slots allocated over the arena's lifetime
    pub fn capacity(&self) -> (usize, usize) {
        (self.nodes.len(), self.paths.len())
    }
}

/// Memory shared by a training run: the feature cache plus one arena
/// partition per worker thread.
#[derive(Debug)]
pub struct Allocator {
    feature_cache: FeatureCache,
    partitions: Vec<Arena>,
}

impl Allocator {
    pub fn new(thread_num: usize) -> Self {
        Self {
            feature_cache: FeatureCache::new(),
            partitions: (0..thread_num.max(1)).map(|_| Arena::new()).collect(),
        }
    }

    pub fn thread_num(&self) -> usize {
        self.partitions.len()
    }

    pub fn feature_cache(&self) -> &FeatureCache {
        &self.feature_cache
    }

    pub fn feature_cache_mut(&mut self) -> &mut FeatureCache {
        &mut self.feature_cache
    }

    /// Arena of worker `thread_id`
    pub fn partition_mut(&mut self, thread_id: usize) -> &mut Arena {
        &mut self.partitions[thread_id]
    }

    /// Read-only feature cache alongside exclusive access to every partition
    pub fn split_mut(&mut self) -> (&FeatureCache, &mut [Arena]) {
        (&self.feature_cache, &mut self.partitions)
    }

    /// Release the feature cache and reset every partition
    pub fn clear(&mut self) {
        self.feature_cache.clear();
        for arena in &mut self.partitions {
            arena.clear();
        }
    }
}
