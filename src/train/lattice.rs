use super::allocator::Arena;
use super::feature_cache::FeatureCache;
use crate::dictionary::FeatureId;

const MINUS_LOG_EPSILON: f64 = 50.0;

/// Handle of a node inside its arena
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeId(u32);

/// Handle of a path inside its arena
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathId(u32);

impl NodeId {
    pub(super) fn new(index: usize) -> Self {
        NodeId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl PathId {
    pub(super) fn new(index: usize) -> Self {
        PathId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A (position, label) cell of the lattice
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Position in the sentence
    pub x: usize,
    /// Label index
    pub y: usize,
    /// Feature cache entry holding the unigram ids of position `x`
    pub fvector: usize,
    /// Forward score, including this node's cost
    pub alpha: f64,
    /// Backward score, including this node's cost
    pub beta: f64,
    pub cost: f64,
    pub best_cost: f64,
    pub prev: Option<NodeId>,
    /// Paths arriving from position `x - 1`
    pub lpath: Vec<PathId>,
    /// Paths leaving to position `x + 1`
    pub rpath: Vec<PathId>,
}

impl Node {
    pub(super) fn reset(&mut self) {
        self.x = 0;
        self.y = 0;
        self.fvector = 0;
        self.alpha = 0.0;
        self.beta = 0.0;
        self.cost = 0.0;
        self.best_cost = 0.0;
        self.prev = None;
        self.lpath.clear();
        self.rpath.clear();
    }
}

/// An edge between two nodes of adjacent positions
#[derive(Debug, Clone, Copy, Default)]
pub struct Path {
    pub lnode: NodeId,
    pub rnode: NodeId,
    /// Feature cache entry holding the bigram ids of the right position
    pub fvector: usize,
    pub cost: f64,
}

/// Read-only state every lattice of a training run shares
#[derive(Debug, Clone, Copy)]
pub struct FeatureSpace<'a> {
    pub cache: &'a FeatureCache,
    pub num_labels: usize,
    /// Scale applied to every summed weight
    pub cost_factor: f64,
}

impl<'a> FeatureSpace<'a> {
    pub fn new(cache: &'a FeatureCache, num_labels: usize) -> Self {
        Self {
            cache,
            num_labels,
            cost_factor: 1.0,
        }
    }
}

/// `log(exp(x) + exp(y))`, or just `y` when `init` is set
#[inline]
pub(crate) fn logsumexp(x: f64, y: f64, init: bool) -> f64 {
    if init {
        return y;
    }
    let vmin = x.min(y);
    let vmax = x.max(y);
    if vmax > vmin + MINUS_LOG_EPSILON {
        vmax
    } else {
        vmax + ((vmin - vmax).exp() + 1.0).ln()
    }
}

/// Node/path grid of one sentence, living in an arena partition
#[derive(Debug)]
pub struct Lattice<'a> {
    arena: &'a mut Arena,
    space: FeatureSpace<'a>,
    size: usize,
}

impl<'a> Lattice<'a> {
    /// Rebuild the lattice of a sentence of `size` tokens whose cache entries
    /// start at `first_entry`, then score it against `weights`.
    ///
    /// Everything previously allocated in `arena` is invalidated.
    pub fn build(
        arena: &'a mut Arena,
        space: FeatureSpace<'a>,
        first_entry: usize,
        size: usize,
        weights: &[f64],
    ) -> Self {
        arena.clear();
        let ysize = space.num_labels;

        for cur in 0..size {
            for y in 0..ysize {
                let id = arena.new_node();
                let node = arena.node_mut(id);
                node.x = cur;
                node.y = y;
                node.fvector = first_entry + cur;
                arena.grid.push(id);
            }
        }

        for cur in 1..size {
            let fvector = first_entry + size + cur - 1;
            for j in 0..ysize {
                for i in 0..ysize {
                    let lnode = arena.grid[(cur - 1) * ysize + j];
                    let rnode = arena.grid[cur * ysize + i];
                    let id = arena.new_path();
                    *arena.path_mut(id) = Path {
                        lnode,
                        rnode,
                        fvector,
                        cost: 0.0,
                    };
                    arena.node_mut(lnode).rpath.push(id);
                    arena.node_mut(rnode).lpath.push(id);
                }
            }
        }

        let mut lattice = Self { arena, space, size };
        lattice.calc_cost(weights);
        lattice
    }

    /// Number of positions
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn num_labels(&self) -> usize {
        self.space.num_labels
    }

    pub fn arena(&self) -> &Arena {
        &*self.arena
    }

    pub fn node_id(&self, x: usize, y: usize) -> NodeId {
        self.arena.grid[x * self.space.num_labels + y]
    }

    pub fn node(&self, x: usize, y: usize) -> &Node {
        self.arena.node(self.node_id(x, y))
    }

    /// Feature ids of a cache entry
    pub fn features(&self, fvector: usize) -> &[FeatureId] {
        self.space.cache.get(fvector)
    }

    /// The path from `(x - 1, y_left)` to `(x, y_right)`
    pub fn path_between(&self, x: usize, y_left: usize, y_right: usize) -> Option<&Path> {
        self.node(x, y_right)
            .lpath
            .iter()
            .map(|&id| self.arena.path(id))
            .find(|path| self.arena.node(path.lnode).y == y_left)
    }

    /// Weight index offset of a path's label pair
    pub fn path_offset(&self, path: &Path) -> usize {
        let left = self.arena.node(path.lnode).y;
        let right = self.arena.node(path.rnode).y;
        left * self.space.num_labels + right
    }

    fn calc_cost(&mut self, weights: &[f64]) {
        let cache = self.space.cache;
        let cost_factor = self.space.cost_factor;
        let ysize = self.space.num_labels;
        let Arena {
            nodes,
            num_nodes,
            paths,
            num_paths,
            ..
        } = &mut *self.arena;

        for node in &mut nodes[..*num_nodes] {
            let c: f64 = cache
                .get(node.fvector)
                .iter()
                .map(|&f| weights[f as usize + node.y])
                .sum();
            node.cost = cost_factor * c;
        }
        for path in &mut paths[..*num_paths] {
            let offset = nodes[path.lnode.index()].y * ysize + nodes[path.rnode.index()].y;
            let c: f64 = cache
                .get(path.fvector)
                .iter()
                .map(|&f| weights[f as usize + offset])
                .sum();
            path.cost = cost_factor * c;
        }
    }

    /// Run forward-backward and return the log partition value `Z`
    pub fn forward_backward(&mut self) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        let ysize = self.space.num_labels;
        let Arena {
            nodes, paths, grid, ..
        } = &mut *self.arena;

        for id in grid.iter() {
            let node = &nodes[id.index()];
            let mut alpha = 0.0;
            for (k, pid) in node.lpath.iter().enumerate() {
                let path = &paths[pid.index()];
                alpha = logsumexp(alpha, path.cost + nodes[path.lnode.index()].alpha, k == 0);
            }
            alpha += node.cost;
            nodes[id.index()].alpha = alpha;
        }

        for id in grid.iter().rev() {
            let node = &nodes[id.index()];
            let mut beta = 0.0;
            for (k, pid) in node.rpath.iter().enumerate() {
                let path = &paths[pid.index()];
                beta = logsumexp(beta, path.cost + nodes[path.rnode.index()].beta, k == 0);
            }
            beta += node.cost;
            nodes[id.index()].beta = beta;
        }

        let mut z = 0.0;
        for (y, id) in grid[..ysize].iter().enumerate() {
            z = logsumexp(z, nodes[id.index()].beta, y == 0);
        }
        z
    }

    /// Add every node and path marginal to `expected`
    pub fn calc_expectation(&self, expected: &mut [f64], z: f64) {
        let ysize = self.space.num_labels;
        for node in &self.arena.nodes[..self.arena.num_nodes] {
            let c = (node.alpha + node.beta - node.cost - z).exp();
            for &f in self.features(node.fvector) {
                expected[f as usize + node.y] += c;
            }
            for pid in &node.lpath {
                let path = self.arena.path(*pid);
                let lnode = self.arena.node(path.lnode);
                let c = (lnode.alpha + path.cost + node.beta - z).exp();
                let offset = lnode.y * ysize + node.y;
                for &f in self.features(path.fvector) {
                    expected[f as usize + offset] += c;
                }
            }
        }
    }

    /// Find the best scoring label sequence, written into `result`.
    /// Returns its score.
    pub fn viterbi(&mut self, result: &mut Vec<usize>) -> f64 {
        result.clear();
        if self.size == 0 {
            return 0.0;
        }
        let ysize = self.space.num_labels;
        let Arena {
            nodes, paths, grid, ..
        } = &mut *self.arena;

        for id in grid.iter() {
            let node = &nodes[id.index()];
            let mut best_cost = -1e37;
            let mut best = None;
            for pid in &node.lpath {
                let path = &paths[pid.index()];
                let cost = nodes[path.lnode.index()].best_cost + path.cost + node.cost;
                if cost > best_cost {
                    best_cost = cost;
                    best = Some(path.lnode);
                }
            }
            let best_cost = if best.is_some() { best_cost } else { node.cost };
            let node = &mut nodes[id.index()];
            node.prev = best;
            node.best_cost = best_cost;
        }

        let last = &grid[(self.size - 1) * ysize..self.size * ysize];
        let mut best_cost = -1e37;
        let mut best = None;
        for id in last {
            let cost = nodes[id.index()].best_cost;
            if best_cost < cost {
                best_cost = cost;
                best = Some(*id);
            }
        }

        result.resize(self.size, 0);
        let mut cur = best;
        while let Some(id) = cur {
            let node = &nodes[id.index()];
            result[node.x] = node.y;
            cur = node.prev;
        }
        best_cost
    }
}
