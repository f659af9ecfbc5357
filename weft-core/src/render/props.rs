//! Property Binding
//!
//! Diffs two prop maps of one element and applies the changes through the
//! host adapter. Each prop name falls into one binding class:
//!
//! - `key`: reserved for the reconciler, never bound
//! - `class`: the element's class string
//! - `style`: individual style properties, from a map or a `"a: b; c: d"` string
//! - `onClick`, `onInput`, ...: event listeners, bound under the lowercased
//!   event name
//! - names with an uppercase letter, and form state such as `value` or
//!   `checked`: node properties
//! - anything else: markup attributes

use indexmap::IndexMap;

use super::host::{HostAdapter, HostNode};
use super::vnode::Props;
use crate::reactive::Value;

const DOM_PROPERTIES: &[&str] = &["value", "checked", "selected", "muted", "disabled"];
const BOOLEAN_PROPERTIES: &[&str] = &["checked", "selected", "muted", "disabled"];

/// Apply the difference between `prev` and `next` to `el`.
pub fn patch_props<H>(host: &H, el: HostNode, prev: Option<&Props>, next: Option<&Props>)
where
    H: HostAdapter + ?Sized,
{
    let empty = Props::new();
    let prev = prev.unwrap_or(&empty);
    let next = next.unwrap_or(&empty);

    for (name, value) in next {
        let old = prev.get(name).unwrap_or(&Value::Null);
        if old.same_value(value) {
            continue;
        }
        patch_prop(host, el, name, old, value);
    }

    for (name, old) in prev {
        if !next.contains_key(name) {
            patch_prop(host, el, name, old, &Value::Null);
        }
    }
}

/// Bind a single prop change.
pub fn patch_prop<H>(host: &H, el: HostNode, name: &str, prev: &Value, next: &Value)
where
    H: HostAdapter + ?Sized,
{
    if name == "key" {
        return;
    }

    if name == "class" {
        host.set_class(el, &next.to_string());
        return;
    }

    if name == "style" {
        patch_style(host, el, prev, next);
        return;
    }

    if let Some(event) = event_name(name) {
        if let Value::Callback(handler) = prev {
            host.remove_event_listener(el, &event, handler);
        }
        if let Value::Callback(handler) = next {
            host.add_event_listener(el, &event, handler);
        }
        return;
    }

    if is_dom_property(name) {
        let value = match next {
            Value::String(s) if s.is_empty() && BOOLEAN_PROPERTIES.contains(&name) => {
                Value::Bool(true)
            }
            other => other.clone(),
        };
        host.set_property(el, name, &value);
        return;
    }

    match next {
        Value::Null | Value::Bool(false) => host.remove_attribute(el, name),
        value => host.set_attribute(el, name, &value.to_string()),
    }
}

/// `onClick` -> `click`. Names like `once` or `on` are plain attributes.
fn event_name(name: &str) -> Option<String> {
    let rest = name.strip_prefix("on")?;
    let first = rest.chars().next()?;
    if first.is_ascii_lowercase() {
        return None;
    }
    Some(rest.to_lowercase())
}

fn is_dom_property(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase()) || DOM_PROPERTIES.contains(&name)
}

fn patch_style<H>(host: &H, el: HostNode, prev: &Value, next: &Value)
where
    H: HostAdapter + ?Sized,
{
    if next.is_null() {
        host.remove_attribute(el, "style");
        return;
    }

    let old = style_map(prev);
    let new = style_map(next);

    for (name, value) in &new {
        if old.get(name) != Some(value) {
            host.set_style(el, name, Some(value));
        }
    }
    for name in old.keys() {
        if !new.contains_key(name) {
            host.set_style(el, name, None);
        }
    }
}

fn style_map(value: &Value) -> IndexMap<String, String> {
    match value {
        Value::String(text) => text
            .split(';')
            .filter_map(|decl| {
                let (name, value) = decl.split_once(':')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_owned(), value.trim().to_owned()))
            })
            .collect(),
        Value::Object(object) if !object.is_list() => object
            .keys()
            .into_iter()
            .filter_map(|key| {
                let value = object.get(key.clone());
                if value.is_null() {
                    return None;
                }
                Some((key.to_string(), value.to_string()))
            })
            .collect(),
        _ => IndexMap::new(),
    }
}
