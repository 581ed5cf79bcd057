//! String heap: a shared UTF-16 buffer and a ref table.
//!
//! Feature cells hold an index into the ref table rather than a raw
//! buffer offset. Copying a record clones the ref entry, so two records
//! never share a ref and a later write to one cannot alias the other.
//!
//! Ref 0 is the null string.

/// Reference table entry.
///
/// Layout (8 bytes on the wire):
/// - offset: 4 bytes (first code unit in the char buffer)
/// - length: 4 bytes (code units)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StringRef {
    pub offset: u32,
    pub length: u32,
}

/// Character buffer plus ref table.
#[derive(Debug, Clone)]
pub struct StringHeap {
    chars: Vec<u16>,
    refs: Vec<StringRef>,
}

impl StringHeap {
    /// Creates an empty string heap.
    pub fn new(capacity: usize) -> Self {
        Self {
            chars: Vec::with_capacity(capacity),
            refs: vec![StringRef::default()],
        }
    }

    /// Stores a string and returns its ref.
    pub fn add_string(&mut self, s: &str) -> i32 {
        let offset = self.chars.len() as u32;
        self.chars.extend(s.encode_utf16());
        let length = self.chars.len() as u32 - offset;
        self.refs.push(StringRef { offset, length });
        (self.refs.len() - 1) as i32
    }

    /// Returns the string behind `r`, or None for the null ref.
    pub fn get_string(&self, r: i32) -> Option<String> {
        if r <= 0 {
            return None;
        }
        let entry = self.refs.get(r as usize)?;
        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        self.chars
            .get(start..end)
            .map(String::from_utf16_lossy)
    }

    /// Adds a second ref to the same characters and returns it.
    pub fn clone_ref(&mut self, r: i32) -> i32 {
        if r <= 0 {
            return 0;
        }
        match self.refs.get(r as usize).copied() {
            Some(entry) => {
                self.refs.push(entry);
                (self.refs.len() - 1) as i32
            }
            None => 0,
        }
    }

    /// Returns true if `r` is the null ref or an existing entry.
    pub fn is_valid_ref(&self, r: i32) -> bool {
        r >= 0 && (r as usize) < self.refs.len()
    }

    /// Returns the character buffer.
    pub fn chars(&self) -> &[u16] {
        &self.chars
    }

    /// Returns the ref table, including the null entry.
    pub fn refs(&self) -> &[StringRef] {
        &self.refs
    }

    /// Returns the number of code units stored.
    pub fn char_len(&self) -> usize {
        self.chars.len()
    }

    /// Returns the number of ref entries, including the null entry.
    pub fn ref_count(&self) -> usize {
        self.refs.len()
    }

    /// Drops every string.
    pub fn reset(&mut self) {
        self.chars.clear();
        self.refs.truncate(1);
    }

    /// Replaces the contents. `refs` excludes the null entry.
    pub fn reinit(&mut self, chars: Vec<u16>, refs: Vec<StringRef>) {
        self.chars = chars;
        self.refs = Vec::with_capacity(refs.len() + 1);
        self.refs.push(StringRef::default());
        self.refs.extend(refs);
    }

    /// Appends characters and ref entries received from a delta.
    pub fn append(&mut self, chars: &[u16], refs: &[StringRef]) {
        self.chars.extend_from_slice(chars);
        self.refs.extend_from_slice(refs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get() {
        let mut heap = StringHeap::new(16);
        let a = heap.add_string("ab cd");
        let b = heap.add_string("");
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(heap.get_string(a).as_deref(), Some("ab cd"));
        assert_eq!(heap.get_string(b).as_deref(), Some(""));
        assert_eq!(heap.get_string(0), None);
        assert_eq!(heap.char_len(), 5);
    }

    #[test]
    fn test_non_bmp_roundtrip() {
        let mut heap = StringHeap::new(0);
        let r = heap.add_string("x\u{1F600}y");
        assert_eq!(heap.char_len(), 4);
        assert_eq!(heap.get_string(r).as_deref(), Some("x\u{1F600}y"));
    }

    #[test]
    fn test_clone_ref_shares_chars() {
        let mut heap = StringHeap::new(0);
        let r = heap.add_string("token");
        let c = heap.clone_ref(r);
        assert_ne!(r, c);
        assert_eq!(heap.char_len(), 5);
        assert_eq!(heap.refs()[r as usize], heap.refs()[c as usize]);
        assert_eq!(heap.clone_ref(0), 0);
    }

    #[test]
    fn test_reset() {
        let mut heap = StringHeap::new(0);
        heap.add_string("gone");
        heap.reset();
        assert_eq!(heap.char_len(), 0);
        assert_eq!(heap.ref_count(), 1);
        assert_eq!(heap.get_string(1), None);
    }

    #[test]
    fn test_reinit_and_append() {
        let mut heap = StringHeap::new(0);
        heap.reinit(
            "abc".encode_utf16().collect(),
            vec![StringRef {
                offset: 0,
                length: 3,
            }],
        );
        assert_eq!(heap.get_string(1).as_deref(), Some("abc"));

        heap.append(
            &"de".encode_utf16().collect::<Vec<_>>(),
            &[StringRef {
                offset: 3,
                length: 2,
            }],
        );
        assert_eq!(heap.get_string(2).as_deref(), Some("de"));
        assert!(heap.is_valid_ref(2));
        assert!(!heap.is_valid_ref(3));
    }
}
