//! Client-side list state: optimistic apply, then reconcile with a fetch.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

#[derive(Debug)]
pub struct ListView<T> {
    confirmed: Vec<T>,
    pending: Vec<T>,
    generation: u64,
    mounted: bool,
    cap: Option<usize>,
}

impl<T> Default for ListView<T> {
    fn default() -> Self {
        Self {
            confirmed: Vec::new(),
            pending: Vec::new(),
            generation: 0,
            mounted: true,
            cap: None,
        }
    }
}

impl<T: Clone> ListView<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A view that never shows more than `cap` items, pending ones included.
    pub fn with_cap(cap: usize) -> Self {
        Self {
            cap: Some(cap),
            ..Self::default()
        }
    }

    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.generation += 1;
        FetchTicket(self.generation)
    }

    /// Replaces everything with the authoritative result. Stale tickets and
    /// unmounted views leave the state untouched.
    pub fn apply_fetch(&mut self, ticket: FetchTicket, items: Vec<T>) -> bool {
        if !self.mounted || ticket.0 != self.generation {
            return false;
        }

        self.confirmed = items;
        self.pending.clear();
        true
    }

    /// Shows `item` ahead of confirmed rows until the next fetch lands.
    pub fn apply_optimistic(&mut self, item: T) {
        if self.mounted {
            self.pending.insert(0, item);
        }
    }

    pub fn remove_where(&mut self, predicate: impl Fn(&T) -> bool) {
        self.pending.retain(|item| !predicate(item));
        self.confirmed.retain(|item| !predicate(item));
    }

    pub fn items(&self) -> Vec<T> {
        self.pending
            .iter()
            .chain(self.confirmed.iter())
            .take(self.cap.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn unmount(&mut self) {
        self.mounted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authoritative_fetch_discards_unconfirmed_items() {
        let mut view = ListView::new();
        let ticket = view.begin_fetch();
        assert!(view.apply_fetch(ticket, vec![1, 2]));

        view.apply_optimistic(3);
        assert_eq!(view.items(), vec![3, 1, 2]);

        let ticket = view.begin_fetch();
        assert!(view.apply_fetch(ticket, vec![1, 2]));
        assert_eq!(view.items(), vec![1, 2]);
        assert_eq!(view.pending_len(), 0);
    }

    #[test]
    fn capped_view_drops_oldest_when_optimistic_items_arrive() {
        let mut view = ListView::with_cap(3);
        let ticket = view.begin_fetch();
        assert!(view.apply_fetch(ticket, vec![3, 2, 1]));

        view.apply_optimistic(4);
        view.apply_optimistic(5);
        assert_eq!(view.items(), vec![5, 4, 3]);
        assert_eq!(view.pending_len(), 2);
    }

    #[test]
    fn most_recent_fetch_wins() {
        let mut view = ListView::new();
        let slow = view.begin_fetch();
        let fast = view.begin_fetch();

        assert!(view.apply_fetch(fast, vec!["fresh"]));
        assert!(!view.apply_fetch(slow, vec!["stale"]));
        assert_eq!(view.items(), vec!["fresh"]);
    }

    #[test]
    fn unmounted_view_ignores_results() {
        let mut view = ListView::new();
        let ticket = view.begin_fetch();
        view.unmount();

        assert!(!view.apply_fetch(ticket, vec![1]));
        view.apply_optimistic(2);
        assert!(view.items().is_empty());
    }

    #[test]
    fn removal_hits_both_layers() {
        let mut view = ListView::new();
        let ticket = view.begin_fetch();
        view.apply_fetch(ticket, vec![1, 2]);
        view.apply_optimistic(1);

        view.remove_where(|item| *item == 1);
        assert_eq!(view.items(), vec![2]);
    }
}
