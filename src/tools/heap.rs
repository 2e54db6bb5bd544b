//! Binary min-heap over any indexable collection.
//!
//! The algorithms here only see a `HeapStore`, i.e., a length, a comparison
//! between two positions, a swap, and push/pop at the end.  The collection
//! decides what is being ordered and can track positions in its `swap`.
//!
//! The layout is the usual one:
//! * parent of i is (i-1)/2
//! * children of i are 2i+1 and 2i+2
//! * the last non-leaf node is n/2-1
//!
//! Ties are broken the same way every time: the right child is only chosen
//! when it is strictly less than the left child, and elements only move when
//! strictly less than the element they displace.  The adaptive model depends
//! on this, since encoder and decoder must build identical trees.

use std::cmp::Ordering;

/// What a collection needs to provide to be managed as a heap
pub trait HeapStore {
    type Item;
    fn len(&self) -> usize;
    /// compare the elements at positions `i` and `j`
    fn compare(&self,i: usize,j: usize) -> Ordering;
    fn swap(&mut self,i: usize,j: usize);
    /// append to the end
    fn push(&mut self,item: Self::Item);
    /// remove from the end
    fn pop(&mut self) -> Option<Self::Item>;
}

impl <T: Ord> HeapStore for Vec<T> {
    type Item = T;
    fn len(&self) -> usize {
        Vec::len(self)
    }
    fn compare(&self,i: usize,j: usize) -> Ordering {
        self[i].cmp(&self[j])
    }
    fn swap(&mut self,i: usize,j: usize) {
        self.as_mut_slice().swap(i,j);
    }
    fn push(&mut self,item: T) {
        Vec::push(self,item);
    }
    fn pop(&mut self) -> Option<T> {
        Vec::pop(self)
    }
}

fn less<H: HeapStore + ?Sized>(h: &H,i: usize,j: usize) -> bool {
    h.compare(i,j) == Ordering::Less
}

/// Sift element `i0` toward the leaves, considering only the first `n` elements.
/// Returns true if the element moved.
fn down<H: HeapStore + ?Sized>(h: &mut H,i0: usize,n: usize) -> bool {
    let mut i = i0;
    loop {
        let j1 = 2*i + 1;
        if j1 >= n {
            break;
        }
        // j is the smaller child, left wins a tie
        let mut j = j1;
        let j2 = j1 + 1;
        if j2 < n && less(h,j2,j1) {
            j = j2;
        }
        if !less(h,j,i) {
            break;
        }
        h.swap(i,j);
        i = j;
    }
    i > i0
}

/// Sift element `j` toward the root.
fn up<H: HeapStore + ?Sized>(h: &mut H,mut j: usize) {
    while j > 0 {
        let i = (j - 1) / 2;
        if !less(h,j,i) {
            break;
        }
        h.swap(i,j);
        j = i;
    }
}

/// Arrange an arbitrary collection into a heap, working bottom up from the last non-leaf.
pub fn init<H: HeapStore + ?Sized>(h: &mut H) {
    let n = h.len();
    for i in (0..n/2).rev() {
        down(h,i,n);
    }
}

/// Add an element, keeping the heap property.
pub fn push<H: HeapStore + ?Sized>(h: &mut H,item: H::Item) {
    h.push(item);
    let last = h.len() - 1;
    up(h,last);
}

/// Remove and return the minimum element, or None if the heap is empty.
pub fn pop<H: HeapStore + ?Sized>(h: &mut H) -> Option<H::Item> {
    if h.len() == 0 {
        return None;
    }
    let n = h.len() - 1;
    h.swap(0,n);
    down(h,0,n);
    h.pop()
}

/// Remove and return the element at position `i`, or None if out of range.
/// The element moved into the gap can violate the heap property in either direction.
pub fn remove<H: HeapStore + ?Sized>(h: &mut H,i: usize) -> Option<H::Item> {
    if i >= h.len() {
        return None;
    }
    let n = h.len() - 1;
    if n != i {
        h.swap(i,n);
        if !down(h,i,n) {
            up(h,i);
        }
    }
    h.pop()
}

/// Restore the heap property after the key at position `i` changed.
pub fn fix<H: HeapStore + ?Sized>(h: &mut H,i: usize) {
    let n = h.len();
    if !down(h,i,n) {
        up(h,i);
    }
}

/// Check that no element is less than its parent.
pub fn verify<H: HeapStore + ?Sized>(h: &H) -> bool {
    (1..h.len()).all(|i| !less(h,i,(i-1)/2))
}

// *************** TESTS *****************

#[cfg(test)]
#[derive(Debug)]
struct Tagged {
    key: u32,
    tag: char
}

#[cfg(test)]
impl PartialEq for Tagged {
    fn eq(&self,other: &Self) -> bool {
        self.key == other.key
    }
}
#[cfg(test)]
impl Eq for Tagged {}
#[cfg(test)]
impl PartialOrd for Tagged {
    fn partial_cmp(&self,other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
#[cfg(test)]
impl Ord for Tagged {
    fn cmp(&self,other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

#[test]
fn init_makes_heap() {
    let mut h = vec![5,2,4,3,8,1];
    init(&mut h);
    assert!(verify(&h));
    assert_eq!(h[0],1);
    let mut h = vec![9,8,7,6,5,4,3,2,1,0];
    init(&mut h);
    assert!(verify(&h));
    assert_eq!(h[0],0);
}

#[test]
fn pop_gives_sorted_order() {
    let mut h = vec![31,4,15,9,26,5,35,8,97,9,32,3,84,6,26,43];
    let mut expected = h.clone();
    expected.sort();
    init(&mut h);
    let mut ans = Vec::new();
    while let Some(x) = pop(&mut h) {
        assert!(verify(&h));
        ans.push(x);
    }
    assert_eq!(ans,expected);
    assert_eq!(pop(&mut h),None);
}

#[test]
fn push_keeps_heap() {
    let mut h: Vec<i32> = Vec::new();
    for x in [7,3,9,1,1,4,0,12,-3,5] {
        push(&mut h,x);
        assert!(verify(&h));
    }
    assert_eq!(h[0],-3);
    assert_eq!(HeapStore::len(&h),10);
}

#[test]
fn remove_at_any_position() {
    // removing index 1 puts 5 in the gap, which then has to sift down
    let mut h = vec![1,2,4,3,8,6,5];
    assert!(verify(&h));
    assert_eq!(remove(&mut h,1),Some(2));
    assert!(verify(&h));
    assert_eq!(h,vec![1,3,4,5,8,6]);
    // here the replacement has to sift up instead
    let mut h = vec![0,10,1,11,12,2,3];
    assert_eq!(remove(&mut h,4),Some(12));
    assert!(verify(&h));
    assert_eq!(h,vec![0,3,1,11,10,2]);
    // last element and out of range
    assert_eq!(remove(&mut h,5),Some(2));
    assert_eq!(remove(&mut h,5),None);
    assert!(verify(&h));
}

#[test]
fn fix_after_key_change() {
    let mut h = vec![3,5,6,7,8,9,10];
    h[5] = 1;
    fix(&mut h,5);
    assert!(verify(&h));
    assert_eq!(h[0],1);
    h[0] = 11;
    fix(&mut h,0);
    assert!(verify(&h));
    assert_eq!(h[0],3);
    let mut sorted = Vec::new();
    while let Some(x) = pop(&mut h) {
        sorted.push(x);
    }
    assert_eq!(sorted,vec![3,5,6,7,8,10,11]);
}

#[test]
fn ties_break_the_same_way() {
    let mut h = vec![
        Tagged { key: 1, tag: 'a' },
        Tagged { key: 1, tag: 'b' },
        Tagged { key: 1, tag: 'c' },
        Tagged { key: 0, tag: 'd' },
        Tagged { key: 1, tag: 'e' }
    ];
    init(&mut h);
    let mut order = String::new();
    while let Some(x) = pop(&mut h) {
        order.push(x.tag);
    }
    // run it twice to be sure nothing depends on anything but the sequence of operations
    let mut h2 = vec![
        Tagged { key: 1, tag: 'a' },
        Tagged { key: 1, tag: 'b' },
        Tagged { key: 1, tag: 'c' },
        Tagged { key: 0, tag: 'd' },
        Tagged { key: 1, tag: 'e' }
    ];
    init(&mut h2);
    let mut order2 = String::new();
    while let Some(x) = pop(&mut h2) {
        order2.push(x.tag);
    }
    assert_eq!(order,order2);
    assert_eq!(order,"debca");
}
