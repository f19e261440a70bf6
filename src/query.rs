use crate::models::{FilterKind, SortKind, Todo};
use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Filters then stably sorts a collection into the order the list shows.
pub fn view(todos: &[Todo], filter: FilterKind, sort: SortKind) -> Vec<Todo> {
    let mut visible = todos
        .iter()
        .filter(|todo| matches_filter(todo, filter))
        .cloned()
        .collect::<Vec<_>>();
    visible.sort_by(|a, b| compare(a, b, sort));
    visible
}

pub fn matches_filter(todo: &Todo, filter: FilterKind) -> bool {
    match filter {
        FilterKind::All => true,
        FilterKind::Active => !todo.completed,
        FilterKind::Completed => todo.completed,
    }
}

fn compare(a: &Todo, b: &Todo, sort: SortKind) -> Ordering {
    match sort {
        SortKind::Newest => b.created_at.cmp(&a.created_at),
        SortKind::Oldest => a.created_at.cmp(&b.created_at),
        SortKind::Alphabetical => compare_text(&a.text, &b.text),
        SortKind::Priority => b.priority.rank().cmp(&a.priority.rank()),
        SortKind::DueDate => match (a.due_date, b.due_date) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    }
}

// Base letters first, then accents, then case with lowercase first.
fn compare_text(a: &str, b: &str) -> Ordering {
    let (a_lower, b_lower) = (a.to_lowercase(), b.to_lowercase());
    base_letters(&a_lower)
        .cmp(base_letters(&b_lower))
        .then_with(|| a_lower.nfd().cmp(b_lower.nfd()))
        .then_with(|| b.cmp(a))
}

fn base_letters(text: &str) -> impl Iterator<Item = char> + '_ {
    text.nfd().filter(|c| !is_combining_mark(*c))
}

#[cfg(test)]
mod tests {
    use super::view;
    use crate::models::{FilterKind, Priority, SortKind, Todo};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).single().expect("base time")
    }

    fn todo(id: &str, text: &str, priority: Priority, minutes: i64) -> Todo {
        Todo {
            id: id.to_string(),
            text: text.to_string(),
            completed: false,
            priority,
            created_at: base() + Duration::minutes(minutes),
            due_date: None,
        }
    }

    fn ids(todos: &[Todo]) -> Vec<&str> {
        todos.iter().map(|todo| todo.id.as_str()).collect()
    }

    #[test]
    fn filters_partition_by_completion() {
        let mut todos = vec![
            todo("a", "a", Priority::Medium, 0),
            todo("b", "b", Priority::Medium, 1),
            todo("c", "c", Priority::Medium, 2),
        ];
        todos[1].completed = true;

        for sort in [SortKind::Newest, SortKind::Alphabetical, SortKind::DueDate] {
            let done = view(&todos, FilterKind::Completed, sort);
            assert!(done.iter().all(|todo| todo.completed));
            assert_eq!(ids(&done), vec!["b"]);

            let active = view(&todos, FilterKind::Active, sort);
            assert!(active.iter().all(|todo| !todo.completed));
            assert_eq!(active.len(), 2);

            assert_eq!(view(&todos, FilterKind::All, sort).len(), todos.len());
        }
    }

    #[test]
    fn recency_sorts_by_creation_time() {
        let todos = vec![
            todo("mid", "x", Priority::Medium, 5),
            todo("old", "y", Priority::Medium, 0),
            todo("new", "z", Priority::Medium, 10),
        ];
        assert_eq!(ids(&view(&todos, FilterKind::All, SortKind::Newest)), vec!["new", "mid", "old"]);
        assert_eq!(ids(&view(&todos, FilterKind::All, SortKind::Oldest)), vec!["old", "mid", "new"]);
    }

    #[test]
    fn alphabetical_ignores_case_before_breaking_ties() {
        let todos = vec![
            todo("1", "banana", Priority::Medium, 0),
            todo("2", "Apple", Priority::Medium, 1),
            todo("3", "cherry", Priority::Medium, 2),
            todo("4", "apple", Priority::Medium, 3),
        ];
        assert_eq!(
            ids(&view(&todos, FilterKind::All, SortKind::Alphabetical)),
            vec!["4", "2", "1", "3"]
        );
    }

    #[test]
    fn alphabetical_sorts_accented_letters_with_their_base() {
        let todos = vec![
            todo("z", "Zebra", Priority::Medium, 0),
            todo("e-acute", "Éclair", Priority::Medium, 1),
            todo("a", "apple", Priority::Medium, 2),
            todo("e", "eclair", Priority::Medium, 3),
            todo("n-tilde", "ñandú", Priority::Medium, 4),
            todo("o", "orange", Priority::Medium, 5),
        ];
        assert_eq!(
            ids(&view(&todos, FilterKind::All, SortKind::Alphabetical)),
            vec!["a", "e", "e-acute", "n-tilde", "o", "z"]
        );
    }

    #[test]
    fn priority_sort_is_stable() {
        let todos = vec![
            todo("low", "l", Priority::Low, 0),
            todo("high", "h", Priority::High, 1),
            todo("medium", "m", Priority::Medium, 2),
            todo("high-2", "h2", Priority::High, 3),
        ];
        assert_eq!(
            ids(&view(&todos, FilterKind::All, SortKind::Priority)),
            vec!["high", "high-2", "medium", "low"]
        );
    }

    #[test]
    fn due_date_sort_puts_undated_last() {
        let mut a = todo("A", "a", Priority::Medium, 0);
        a.due_date = Some(base() + Duration::days(2));
        let b = todo("B", "b", Priority::Medium, 1);
        let mut c = todo("C", "c", Priority::Medium, 2);
        c.due_date = Some(base() + Duration::days(1));
        let d = todo("D", "d", Priority::Medium, 3);

        let sorted = view(&[a, b, c, d], FilterKind::All, SortKind::DueDate);
        assert_eq!(ids(&sorted), vec!["C", "A", "B", "D"]);
    }

    #[test]
    fn view_is_repeatable() {
        let todos = vec![
            todo("1", "same", Priority::Low, 0),
            todo("2", "same", Priority::Low, 0),
        ];
        let first = view(&todos, FilterKind::All, SortKind::Alphabetical);
        let second = view(&todos, FilterKind::All, SortKind::Alphabetical);
        assert_eq!(first, second);
        assert_eq!(ids(&first), vec!["1", "2"]);
    }
}
