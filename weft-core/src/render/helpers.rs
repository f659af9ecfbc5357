//! Render helpers for lists and names.

use crate::reactive::{Field, Key, Reactive};

use super::vnode::VNode;

/// One node per list item. Reads the length and every item, so the calling
/// render re-runs when the list grows, shrinks or changes.
pub fn render_list<F>(list: &Reactive, mut f: F) -> Vec<VNode>
where
    F: FnMut(Field, usize) -> VNode,
{
    list.items()
        .into_iter()
        .enumerate()
        .map(|(index, item)| f(item, index))
        .collect()
}

/// One node per map entry, in insertion order.
pub fn render_entries<F>(map: &Reactive, mut f: F) -> Vec<VNode>
where
    F: FnMut(Field, &Key, usize) -> VNode,
{
    map.entries()
        .into_iter()
        .enumerate()
        .map(|(index, (key, value))| f(value, &key, index))
        .collect()
}

/// One node per number in `1..=count`.
pub fn render_range<F>(count: usize, f: F) -> Vec<VNode>
where
    F: FnMut(usize) -> VNode,
{
    (1..=count).map(f).collect()
}

/// `todo-item` -> `todoItem`.
pub fn camelize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `todoItem` -> `TodoItem`.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{ObjectRef, Runtime};
    use crate::render::vnode::{h, text};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn names_convert() {
        assert_eq!(camelize("todo-item"), "todoItem");
        assert_eq!(camelize("a-b-c"), "aBC");
        assert_eq!(camelize("plain"), "plain");
        assert_eq!(capitalize("todoItem"), "TodoItem");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn range_is_one_based() {
        let nodes = render_range(3, |n| text(n.to_string()));
        let texts: Vec<_> = nodes.iter().map(|n| n.text().unwrap().to_owned()).collect();
        assert_eq!(texts, ["1", "2", "3"]);
        assert!(render_range(0, |n| text(n.to_string())).is_empty());
    }

    #[test]
    fn list_and_entries_follow_order() {
        let rt = Runtime::new();
        let list = rt.reactive(ObjectRef::from_values(["a", "b"]));
        let nodes = render_list(&list, |item, i| h("li", None, format!("{i}:{item}")));
        assert_eq!(nodes[1].text(), Some("1:b"));

        let map = rt.reactive(ObjectRef::from_entries([("x", 1), ("y", 2)]));
        let nodes = render_entries(&map, |value, key, _| h("dt", None, format!("{key}={value}")));
        assert_eq!(nodes[0].text(), Some("x=1"));
        assert_eq!(nodes[1].text(), Some("y=2"));
    }

    #[test]
    fn list_rendering_tracks_growth() {
        let rt = Runtime::new();
        let list = rt.reactive(ObjectRef::from_values([1, 2]));
        let runs = Arc::new(AtomicUsize::new(0));

        let _effect = rt.effect({
            let list = list.clone();
            let runs = runs.clone();
            move || {
                render_list(&list, |item, _| h("li", None, item.to_string()));
                runs.fetch_add(1, Ordering::SeqCst);
            }
        });

        list.push(3);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
