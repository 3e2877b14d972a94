//! Chunked output buffer with out-of-order sub-buffers.
//!
//! The buffer is a tree held in one arena. Each node is an ordered list of
//! slots: owned byte blocks that are filled by copying, shared [`Bytes`]
//! taken over without copying, and child nodes ("sub-buffers") that reserve
//! a position whose content arrives later. Nodes address each other through
//! [`BufferId`] handles; a child only knows its parent's id, which it uses to
//! report readiness.
//!
//! A node is *ready* once [`ChunkBuffer::end`] was called on it and every
//! child is ready. [`ChunkBuffer::extract`] is only legal on a ready root and
//! returns the slots in tree order, children inlined at their reservation
//! points.
//!
//! # Beispiel
//!
//! ```
//! use structbin::chunk_buffer::ChunkBuffer;
//!
//! let mut buf = ChunkBuffer::new();
//! let root = buf.root();
//! buf.put_bytes(root, b"head ");
//! let later = buf.allocate_sub_buffer(root);
//! buf.put_bytes(root, b" tail");
//! buf.end(root);
//! assert!(!buf.is_ready(root));
//!
//! buf.put_bytes(later, b"middle");
//! buf.end(later);
//! assert!(buf.is_ready(root));
//! assert_eq!(buf.extract().concat(), b"head middle tail");
//! ```

use bytes::Bytes;

/// Chunks of at least this size are referenced instead of copied.
pub const ZERO_COPY_THRESHOLD: usize = 16 * 1024;

/// Smallest owned block the growth policy allocates.
pub const MIN_BLOCK_SIZE: usize = 512;

/// Growth ceiling for owned blocks; single larger writes double past it.
pub const MAX_BLOCK_SIZE: usize = 1024 * 1024;

/// Handle to one node of a [`ChunkBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(usize);

/// One position in a node.
#[derive(Debug, Clone, Copy)]
enum Slot {
    /// Index into `ChunkBuffer::blocks`.
    Owned(usize),
    /// Index into `ChunkBuffer::shared`.
    Shared(usize),
    Child(BufferId),
}

#[derive(Debug)]
struct Node {
    parent: Option<BufferId>,
    slots: Vec<Slot>,
    /// Block currently accepting bytes (Filling state). `None` once finalized.
    filling: Option<usize>,
    /// Capacity of the filling block; tracked separately from `Vec::capacity`.
    filling_cap: usize,
    last_allocated: usize,
    pending_children: usize,
    ended: bool,
    ready: bool,
}

impl Node {
    fn new(parent: Option<BufferId>) -> Self {
        Self {
            parent,
            slots: Vec::new(),
            filling: None,
            filling_cap: 0,
            last_allocated: 0,
            pending_children: 0,
            ended: false,
            ready: false,
        }
    }
}

/// Growable, order-preserving output tree.
#[derive(Debug)]
pub struct ChunkBuffer {
    nodes: Vec<Node>,
    /// Owned byte blocks, addressed by `Slot::Owned`.
    blocks: Vec<Vec<u8>>,
    /// Zero-copy chunks, addressed by `Slot::Shared`.
    shared: Vec<Bytes>,
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Next block size: twice the previous one, clamped to
/// [`MIN_BLOCK_SIZE`, `MAX_BLOCK_SIZE`], then doubled until `pending` fits.
fn next_block_size(last_allocated: usize, pending: usize) -> usize {
    let mut size = last_allocated.saturating_mul(2).clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE);
    while size < pending {
        size *= 2;
    }
    size
}

impl ChunkBuffer {
    /// Creates a buffer with an empty root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(None)],
            blocks: Vec::new(),
            shared: Vec::new(),
        }
    }

    pub fn root(&self) -> BufferId {
        BufferId(0)
    }

    pub fn is_ready(&self, id: BufferId) -> bool {
        self.nodes[id.0].ready
    }

    fn node_mut(&mut self, id: BufferId) -> &mut Node {
        let node = &mut self.nodes[id.0];
        assert!(!node.ended, "write to buffer {} after end()", id.0);
        node
    }

    /// Copies `chunk` into the node, spilling into a fresh block when the
    /// filling block runs out of capacity.
    pub fn put_bytes(&mut self, id: BufferId, mut chunk: &[u8]) {
        self.node_mut(id);
        while !chunk.is_empty() {
            let node = &self.nodes[id.0];
            let Some(block) = node.filling else {
                self.allocate_block(id, chunk.len());
                continue;
            };
            let free = node.filling_cap - self.blocks[block].len();
            if free == 0 {
                self.allocate_block(id, chunk.len());
                continue;
            }
            let take = free.min(chunk.len());
            self.blocks[block].extend_from_slice(&chunk[..take]);
            chunk = &chunk[take..];
        }
    }

    /// Appends an owned chunk. Chunks of [`ZERO_COPY_THRESHOLD`] bytes or
    /// more become their own slot without copying; smaller ones are copied.
    pub fn put_shared(&mut self, id: BufferId, chunk: Bytes) {
        if chunk.len() < ZERO_COPY_THRESHOLD {
            self.put_bytes(id, &chunk);
            return;
        }
        self.node_mut(id);
        self.finalize_filling(id);
        let index = self.shared.len();
        self.shared.push(chunk);
        self.nodes[id.0].slots.push(Slot::Shared(index));
    }

    /// Reserves the current position for content written later through the
    /// returned handle. The parent cannot become ready before the child.
    pub fn allocate_sub_buffer(&mut self, id: BufferId) -> BufferId {
        self.node_mut(id);
        self.finalize_filling(id);
        let child = BufferId(self.nodes.len());
        self.nodes.push(Node::new(Some(id)));
        let node = &mut self.nodes[id.0];
        node.pending_children += 1;
        node.slots.push(Slot::Child(child));
        child
    }

    /// Declares that no more bytes will be written to `id`. Marks the node
    /// ready if no child is pending and propagates readiness upward.
    pub fn end(&mut self, id: BufferId) {
        self.node_mut(id);
        self.finalize_filling(id);
        let node = &mut self.nodes[id.0];
        node.ended = true;
        if node.pending_children == 0 {
            self.mark_ready(id);
        }
    }

    fn mark_ready(&mut self, mut id: BufferId) {
        loop {
            let node = &mut self.nodes[id.0];
            assert!(!node.ready, "buffer {} became ready twice", id.0);
            node.ready = true;
            let Some(parent) = node.parent else {
                return;
            };
            // on_child_ready
            let parent_node = &mut self.nodes[parent.0];
            assert!(parent_node.pending_children > 0, "unexpected child readiness");
            parent_node.pending_children -= 1;
            if !(parent_node.ended && parent_node.pending_children == 0) {
                return;
            }
            id = parent;
        }
    }

    fn finalize_filling(&mut self, id: BufferId) {
        let node = &mut self.nodes[id.0];
        if node.filling.take().is_some() {
            node.filling_cap = 0;
        }
    }

    fn allocate_block(&mut self, id: BufferId, pending: usize) {
        let node = &mut self.nodes[id.0];
        let size = next_block_size(node.last_allocated, pending);
        node.last_allocated = size;
        let index = self.blocks.len();
        node.filling = Some(index);
        node.filling_cap = size;
        node.slots.push(Slot::Owned(index));
        self.blocks.push(Vec::with_capacity(size));
    }

    /// Consumes the buffer and returns its byte regions in order.
    ///
    /// # Panics
    ///
    /// Panics if the root is not ready.
    pub fn extract(mut self) -> Vec<Bytes> {
        let root = self.root();
        assert!(self.is_ready(root), "extract() on a buffer that is not ready");

        let mut out = Vec::with_capacity(self.blocks.len() + self.shared.len());
        // Stack von (Knoten, naechster Slot-Index).
        let mut stack = vec![(root, 0usize)];
        while let Some((id, pos)) = stack.pop() {
            let Some(&slot) = self.nodes[id.0].slots.get(pos) else {
                continue;
            };
            stack.push((id, pos + 1));
            match slot {
                Slot::Owned(index) => {
                    let block = std::mem::take(&mut self.blocks[index]);
                    if !block.is_empty() {
                        out.push(Bytes::from(block));
                    }
                }
                Slot::Shared(index) => out.push(std::mem::take(&mut self.shared[index])),
                Slot::Child(child) => stack.push((child, 0)),
            }
        }
        out
    }
}
