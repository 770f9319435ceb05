use std::collections::HashMap;

/// Stable reference to a surface owned by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceHandle(u64);

impl SurfaceHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Owns values behind [`SurfaceHandle`]s and iterates them in insertion order.
///
/// Handles are never reused within one arena.
#[derive(Debug)]
pub struct SurfaceArena<T> {
    next_id: u64,
    entries: HashMap<SurfaceHandle, T>,
    order: Vec<SurfaceHandle>,
}

impl<T> Default for SurfaceArena<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T> SurfaceArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> SurfaceHandle {
        let handle = SurfaceHandle(self.next_id);
        self.next_id += 1;
        self.entries.insert(handle, value);
        self.order.push(handle);
        handle
    }

    pub fn get(&self, handle: SurfaceHandle) -> Option<&T> {
        self.entries.get(&handle)
    }

    pub fn get_mut(&mut self, handle: SurfaceHandle) -> Option<&mut T> {
        self.entries.get_mut(&handle)
    }

    /// Takes a value out; its handle stays retired.
    pub fn remove(&mut self, handle: SurfaceHandle) -> Option<T> {
        let value = self.entries.remove(&handle)?;
        self.order.retain(|&h| h != handle);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Handles in insertion order, which is also draw order.
    pub fn handles(&self) -> &[SurfaceHandle] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (SurfaceHandle, &T)> + '_ {
        self.order
            .iter()
            .filter_map(move |&handle| self.entries.get(&handle).map(|value| (handle, value)))
    }

    /// Mutable access to every value; order is unspecified.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.entries.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_in_insertion_order() {
        let mut arena = SurfaceArena::new();
        let a = arena.insert("triangle");
        let b = arena.insert("cube");
        let c = arena.insert("model");

        let names: Vec<_> = arena.iter().map(|(_, name)| *name).collect();
        assert_eq!(names, vec!["triangle", "cube", "model"]);
        assert_eq!(arena.handles(), &[a, b, c]);
    }

    #[test]
    fn handles_are_per_arena() {
        let mut first = SurfaceArena::new();
        let mut second = SurfaceArena::new();
        let a = first.insert(1);
        let b = first.insert(2);
        assert_ne!(a, b);

        let c = second.insert(3);
        assert_eq!(c, a);
        assert_eq!(second.get(b), None);
        assert_eq!(second.len(), 1);
        assert!(!second.is_empty());
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut arena = SurfaceArena::new();
        let handle = arena.insert(vec![1]);
        arena.get_mut(handle).unwrap().push(2);
        assert_eq!(arena.get(handle), Some(&vec![1, 2]));
    }

    #[test]
    fn remove_keeps_order_and_retires_handle() {
        let mut arena = SurfaceArena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        let c = arena.insert("c");

        assert_eq!(arena.remove(b), Some("b"));
        assert_eq!(arena.remove(b), None);
        assert_eq!(arena.handles(), &[a, c]);
        assert_eq!(arena.len(), 2);

        let d = arena.insert("d");
        assert_ne!(d, b);
        assert_eq!(arena.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec!["a", "c", "d"]);
    }
}
