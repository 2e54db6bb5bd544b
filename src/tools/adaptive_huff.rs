//! Module to maintain the adaptive Huffman model.
//! This is used by the `huff` module, on both the encoding and decoding side.
//!
//! The leaves (one per symbol seen so far, plus two control symbols) persist for the
//! whole session and are kept in a heap ordered by frequency.  After every insertion
//! or frequency update the whole tree is rebuilt from scratch from that heap.
//! Nothing is incremental here: the decoder performs exactly the same sequence of heap
//! operations as the encoder, and that is the only thing keeping them in sync.
//!
//! Nodes live in an arena.  The leaves occupy the front of the arena in order of first
//! appearance, the branches follow, and are thrown away at each rebuild.

use bit_vec::BitVec;
use std::cmp::Ordering;
use super::heap::{self,HeapStore};

/// number of entries in the symbol table, 256 bytes plus 2 control symbols
const NUM_SLOTS: usize = 258;
/// arena index of the NEW leaf, fixed for the life of the model
const NEW_CHARACTER_ID: usize = 0;
/// arena index of the END leaf, fixed for the life of the model
const END_OF_STREAM_ID: usize = 1;

/// Symbols that can appear in the tree
#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub enum Symbol {
    /// a literal byte value
    Byte(u8),
    /// escape, a never before seen byte follows in 8 raw bits
    NewCharacter,
    /// end of the compressed data
    EndOfStream
}

impl Symbol {
    fn slot(&self) -> usize {
        match self {
            Symbol::Byte(b) => *b as usize,
            Symbol::NewCharacter => 256,
            Symbol::EndOfStream => 257
        }
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self,f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Symbol::Byte(b) => write!(f,"{:02X}",b),
            Symbol::NewCharacter => write!(f,"NEW"),
            Symbol::EndOfStream => write!(f,"END")
        }
    }
}

/// Tree node, either a leaf with a symbol or a branch with two children.
#[derive(Clone,Debug)]
pub struct Node {
    /// occurrences for a leaf, sum of the children for a branch
    freq: u64,
    symbol: Option<Symbol>,
    left: Option<usize>,
    right: Option<usize>,
    /// valid as of the last rebuild, None for the root
    parent: Option<usize>,
    /// position in the leaf heap, unused for branches
    heap_index: usize
}

impl Node {
    fn leaf(symbol: Symbol) -> Self {
        Self {
            freq: 1,
            symbol: Some(symbol),
            left: None,
            right: None,
            parent: None,
            heap_index: 0
        }
    }
    fn branch(left: usize,right: usize,freq: u64) -> Self {
        Self {
            freq,
            symbol: None,
            left: Some(left),
            right: Some(right),
            parent: None,
            heap_index: 0
        }
    }
    pub fn frequency(&self) -> u64 {
        self.freq
    }
    pub fn symbol(&self) -> Option<Symbol> {
        self.symbol
    }
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }
    /// (left,right) for a branch, None for a leaf
    pub fn children(&self) -> Option<(usize,usize)> {
        match (self.left,self.right) {
            (Some(l),Some(r)) => Some((l,r)),
            _ => None
        }
    }
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Heap view of a list of node indices, keyed by frequency.
struct NodeQueue<'a> {
    ids: &'a mut Vec<usize>,
    nodes: &'a mut Vec<Node>,
    /// whether to keep `heap_index` current, only the persistent leaf heap does this
    track: bool
}

impl <'a> NodeQueue<'a> {
    fn leaves(ids: &'a mut Vec<usize>,nodes: &'a mut Vec<Node>) -> Self {
        Self { ids, nodes, track: true }
    }
    fn scratch(ids: &'a mut Vec<usize>,nodes: &'a mut Vec<Node>) -> Self {
        Self { ids, nodes, track: false }
    }
}

impl HeapStore for NodeQueue<'_> {
    type Item = usize;
    fn len(&self) -> usize {
        self.ids.len()
    }
    fn compare(&self,i: usize,j: usize) -> Ordering {
        self.nodes[self.ids[i]].freq.cmp(&self.nodes[self.ids[j]].freq)
    }
    fn swap(&mut self,i: usize,j: usize) {
        self.ids.as_mut_slice().swap(i,j);
        if self.track {
            self.nodes[self.ids[i]].heap_index = i;
            self.nodes[self.ids[j]].heap_index = j;
        }
    }
    fn push(&mut self,id: usize) {
        if self.track {
            self.nodes[id].heap_index = self.ids.len();
        }
        self.ids.push(id);
    }
    fn pop(&mut self) -> Option<usize> {
        self.ids.pop()
    }
}

/// The adaptive model, one per encoding or decoding session.
pub struct SymbolModel {
    /// arena, leaves first, then the branches of the current tree
    nodes: Vec<Node>,
    /// heap of leaf indices, least frequent first
    leaves: Vec<usize>,
    /// symbol slot to leaf index
    symbol_index: Vec<Option<usize>>,
    root: usize
}

impl SymbolModel {
    /// Start with only the two control symbols, each with frequency 1.
    pub fn new() -> Self {
        let mut nodes = vec![Node::leaf(Symbol::NewCharacter),Node::leaf(Symbol::EndOfStream)];
        let mut leaves = vec![NEW_CHARACTER_ID,END_OF_STREAM_ID];
        for (pos,id) in leaves.iter().enumerate() {
            nodes[*id].heap_index = pos;
        }
        heap::init(&mut NodeQueue::leaves(&mut leaves,&mut nodes));
        let mut symbol_index = vec![None;NUM_SLOTS];
        for id in &leaves {
            if let Some(sym) = nodes[*id].symbol {
                symbol_index[sym.slot()] = Some(*id);
            }
        }
        let mut ans = Self {
            nodes,
            leaves,
            symbol_index,
            root: 0
        };
        ans.rebuild_tree();
        ans
    }
    /// index of the leaf for this symbol, if it has been seen
    pub fn lookup(&self,sym: Symbol) -> Option<usize> {
        self.symbol_index[sym.slot()]
    }
    /// leaf index of the NEW control symbol
    pub fn new_character(&self) -> usize {
        NEW_CHARACTER_ID
    }
    /// leaf index of the END control symbol
    pub fn end_of_stream(&self) -> usize {
        END_OF_STREAM_ID
    }
    pub fn node(&self,id: usize) -> &Node {
        &self.nodes[id]
    }
    pub fn root(&self) -> usize {
        self.root
    }
    /// number of leaves, including the two control symbols
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }
    /// Add a leaf for a byte value that has not been seen yet, and rebuild the tree.
    /// Returns the index of the new leaf.  If the byte already has a leaf, that leaf
    /// is updated instead, so there is never more than one leaf per byte.
    pub fn insert(&mut self,byte: u8) -> usize {
        let sym = Symbol::Byte(byte);
        if let Some(id) = self.lookup(sym) {
            log::warn!("symbol {} is already in the model, counting it instead",sym);
            self.update(id);
            return id;
        }
        self.nodes.truncate(self.leaves.len());
        let id = self.nodes.len();
        self.nodes.push(Node::leaf(sym));
        heap::push(&mut NodeQueue::leaves(&mut self.leaves,&mut self.nodes),id);
        self.symbol_index[sym.slot()] = Some(id);
        log::trace!("insert {} as leaf {}",sym,id);
        self.rebuild_tree();
        id
    }
    /// Count one more occurrence of the symbol at leaf `id`, and rebuild the tree.
    pub fn update(&mut self,id: usize) {
        debug_assert!(id < self.leaves.len() && self.nodes[id].is_leaf());
        self.nodes[id].freq += 1;
        let pos = self.nodes[id].heap_index;
        let mut queue = NodeQueue::leaves(&mut self.leaves,&mut self.nodes);
        heap::fix(&mut queue,pos);
        debug_assert!(heap::verify(&queue));
        self.rebuild_tree();
    }
    /// Build the Huffman tree from the current leaves.
    /// The two least frequent nodes are joined, the first one popped goes on the left.
    fn rebuild_tree(&mut self) {
        self.nodes.truncate(self.leaves.len());
        let mut scratch = self.leaves.clone();
        let mut queue = NodeQueue::scratch(&mut scratch,&mut self.nodes);
        while queue.len() > 1 {
            let (Some(left),Some(right)) = (heap::pop(&mut queue),heap::pop(&mut queue)) else {
                break;
            };
            let id = queue.nodes.len();
            let freq = queue.nodes[left].freq + queue.nodes[right].freq;
            queue.nodes.push(Node::branch(left,right,freq));
            queue.nodes[left].parent = Some(id);
            queue.nodes[right].parent = Some(id);
            heap::push(&mut queue,id);
        }
        self.root = scratch[0];
    }
    /// Code for the node at `id`, found by walking up to the root.
    /// Returns (code,count), the bit nearest the root is bit `count-1`, the bit nearest
    /// the node is bit 0, a right branch is a 1.
    pub fn code(&self,id: usize) -> (u64,u8) {
        let mut code: u64 = 0;
        let mut count: u8 = 0;
        let mut child = id;
        while let Some(parent) = self.nodes[child].parent {
            if self.nodes[parent].right == Some(child) {
                code |= 1 << count;
            }
            count += 1;
            child = parent;
        }
        (code,count)
    }
    /// Every leaf with its code, in order of left-to-right traversal.
    pub fn code_table(&self) -> Vec<(Symbol,BitVec)> {
        let mut ans = Vec::new();
        let mut stack = vec![(self.root,BitVec::new())];
        while let Some((id,path)) = stack.pop() {
            let node = &self.nodes[id];
            match (node.children(),node.symbol) {
                (Some((l,r)),_) => {
                    let mut rpath = path.clone();
                    rpath.push(true);
                    stack.push((r,rpath));
                    let mut lpath = path;
                    lpath.push(false);
                    stack.push((l,lpath));
                },
                (None,Some(sym)) => ans.push((sym,path)),
                (None,None) => {}
            }
        }
        ans
    }
    /// dump the code table at trace level
    pub fn log_code_table(&self) {
        if log::log_enabled!(log::Level::Trace) {
            for (sym,bits) in self.code_table() {
                let freq = match self.lookup(sym) {
                    Some(id) => self.nodes[id].freq,
                    None => 0
                };
                log::trace!("{}: {:?} freq {}",sym,bits,freq);
            }
        }
    }
}

impl Default for SymbolModel {
    fn default() -> Self {
        Self::new()
    }
}

// *************** TESTS *****************

#[cfg(test)]
fn code_bits(model: &SymbolModel,sym: Symbol) -> BitVec {
    let (code,count) = model.code(model.lookup(sym).expect("missing symbol"));
    let mut ans = BitVec::new();
    for i in (0..count).rev() {
        ans.push(code & (1 << i) > 0);
    }
    ans
}

/// check the tree is consistent with the leaves, and the leaves form a heap
#[cfg(test)]
fn check_tree(model: &SymbolModel) {
    let leaves = model.leaf_count();
    assert_eq!(model.nodes.len(),2*leaves - 1);
    assert_eq!(model.node(model.root()).parent(),None);
    for id in 0..model.nodes.len() {
        let node = model.node(id);
        match node.children() {
            Some((l,r)) => {
                assert!(id >= leaves);
                assert_eq!(node.frequency(),model.node(l).frequency() + model.node(r).frequency());
                assert_eq!(model.node(l).parent(),Some(id));
                assert_eq!(model.node(r).parent(),Some(id));
                assert!(node.symbol().is_none());
            },
            None => {
                assert!(id < leaves);
                assert!(node.frequency() >= 1);
                assert!(node.is_leaf());
            }
        }
    }
    for (pos,id) in model.leaves.iter().enumerate() {
        assert_eq!(model.node(*id).heap_index,pos);
    }
    let mut ids = model.leaves.clone();
    let mut nodes = model.nodes.clone();
    assert!(heap::verify(&NodeQueue::scratch(&mut ids,&mut nodes)));
}

#[test]
fn initial_tree() {
    let model = SymbolModel::new();
    check_tree(&model);
    assert_eq!(model.leaf_count(),2);
    let new_char = model.lookup(Symbol::NewCharacter).unwrap();
    let end = model.lookup(Symbol::EndOfStream).unwrap();
    assert_eq!(new_char,model.new_character());
    assert_eq!(end,model.end_of_stream());
    assert_eq!(model.code(new_char),(0,1));
    assert_eq!(model.code(end),(1,1));
    assert_eq!(model.lookup(Symbol::Byte(0)),None);
}

#[test]
fn codes_follow_frequency() {
    let mut model = SymbolModel::new();
    let a = model.insert(b'A');
    check_tree(&model);
    assert_eq!(model.code(a),(0b11,2));
    assert_eq!(model.code(model.lookup(Symbol::NewCharacter).unwrap()),(0b10,2));
    assert_eq!(model.code(model.lookup(Symbol::EndOfStream).unwrap()),(0,1));
    model.update(a);
    check_tree(&model);
    assert_eq!(model.node(a).frequency(),2);
    assert_eq!(model.code(a),(0,1));
    assert_eq!(model.code(model.lookup(Symbol::NewCharacter).unwrap()),(0b10,2));
    assert_eq!(model.code(model.lookup(Symbol::EndOfStream).unwrap()),(0b11,2));
}

#[test]
fn update_adds_one() {
    let mut model = SymbolModel::new();
    let ids: Vec<usize> = b"hello".iter().filter_map(|b| match model.lookup(Symbol::Byte(*b)) {
        Some(_) => None,
        None => Some(model.insert(*b))
    }).collect();
    for round in 0..20 {
        let id = ids[(round * 7) % ids.len()];
        let before = model.node(id).frequency();
        model.update(id);
        assert_eq!(model.node(id).frequency(),before + 1);
        check_tree(&model);
    }
}

#[test]
fn code_matches_table() {
    let mut model = SymbolModel::new();
    for b in b"abracadabra" {
        match model.lookup(Symbol::Byte(*b)) {
            Some(id) => model.update(id),
            None => { model.insert(*b); }
        }
    }
    let table = model.code_table();
    assert_eq!(table.len(),model.leaf_count());
    for (sym,bits) in &table {
        assert_eq!(*bits,code_bits(&model,*sym));
    }
    // 'a' is the most frequent and cannot have a longer code than anything else
    let a_len = code_bits(&model,Symbol::Byte(b'a')).len();
    assert!(table.iter().all(|(_,bits)| bits.len() >= a_len));
}

#[test]
fn independent_models_agree() {
    // deterministic pseudo random event stream
    let mut seed: u32 = 12345;
    let mut next = || {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        ((seed >> 16) % 40) as u8
    };
    let mut m1 = SymbolModel::new();
    let mut m2 = SymbolModel::new();
    for _i in 0..500 {
        let b = next();
        let sym = Symbol::Byte(b);
        match (m1.lookup(sym),m2.lookup(sym)) {
            (Some(id1),Some(id2)) => {
                assert_eq!(m1.code(id1),m2.code(id2));
                m1.update(id1);
                m2.update(id2);
            },
            (None,None) => {
                m1.insert(b);
                m2.insert(b);
            },
            _ => panic!("models disagree on symbol set")
        }
        for (sym,bits) in m1.code_table() {
            assert_eq!(bits,code_bits(&m2,sym));
        }
    }
    check_tree(&m1);
    check_tree(&m2);
}

#[test]
fn insert_existing_byte() {
    let mut model = SymbolModel::new();
    let a = model.insert(b'A');
    assert_eq!(model.insert(b'A'),a);
    check_tree(&model);
    assert_eq!(model.leaf_count(),3);
    assert_eq!(model.node(a).frequency(),2);
    assert_eq!(model.code(a),(0,1));
}

#[test]
fn all_bytes_once() {
    let mut model = SymbolModel::new();
    for b in 0..=255u8 {
        model.insert(b);
    }
    check_tree(&model);
    assert_eq!(model.leaf_count(),258);
    for (_sym,bits) in model.code_table() {
        assert!(bits.len() == 8 || bits.len() == 9);
    }
}
