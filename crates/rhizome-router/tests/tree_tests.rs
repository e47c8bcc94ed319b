//! Namespace tree tests
//!
//! Multicast to ancestors, retained state and subscriber bookkeeping.

use rhizome_core::{Address, Arg};
use rhizome_router::NamespaceTree;

fn addr(s: &str) -> Address {
    Address::parse(s).unwrap()
}

#[test]
fn test_delivery_set_walks_root_to_leaf() {
    let mut tree = NamespaceTree::new();
    tree.subscribe(&addr("/bla/bli/blob"), "leaf");
    tree.subscribe(&addr("/bla"), "bla");
    tree.subscribe(&addr("/"), "root");
    tree.subscribe(&addr("/bla/bli"), "bli");

    assert_eq!(
        tree.delivery_set(&addr("/bla/bli/blob")),
        vec!["root", "bla", "bli", "leaf"]
    );
}

#[test]
fn test_delivery_set_skips_unrelated_branches() {
    let mut tree = NamespaceTree::new();
    tree.subscribe(&addr("/bla"), "bla");
    tree.subscribe(&addr("/blob"), "blob");
    tree.subscribe(&addr("/"), "root");

    assert_eq!(tree.delivery_set(&addr("/bla/bli")), vec!["root", "bla"]);
    assert_eq!(tree.delivery_set(&addr("/blob/")), vec!["root", "blob"]);
    assert_eq!(tree.delivery_set(&addr("/other")), vec!["root"]);
}

#[test]
fn test_delivery_set_does_not_create_nodes() {
    let mut tree = NamespaceTree::new();
    tree.subscribe(&addr("/bla"), "bla");
    let before = tree.len();

    assert_eq!(tree.delivery_set(&addr("/bla/bli/blob")), vec!["bla"]);
    assert_eq!(tree.len(), before);
}

#[test]
fn test_one_delivery_per_level() {
    let mut tree = NamespaceTree::new();
    tree.subscribe(&addr("/"), "a");
    tree.subscribe(&addr("/bla"), "a");

    assert_eq!(tree.delivery_set(&addr("/bla/bli")), vec!["a", "a"]);
}

#[test]
fn test_subscribe_is_idempotent() {
    let mut tree = NamespaceTree::new();
    assert!(tree.subscribe(&addr("/bla"), "a"));
    assert!(!tree.subscribe(&addr("/bla/"), "a"));
    assert!(tree.subscribe(&addr("/bla"), "b"));

    assert_eq!(tree.subscribers(&addr("/bla")), vec!["a", "b"]);
}

#[test]
fn test_unsubscribe_all() {
    let mut tree = NamespaceTree::new();
    tree.subscribe(&addr("/"), "a");
    tree.subscribe(&addr("/bla"), "a");
    tree.subscribe(&addr("/bla"), "b");

    assert_eq!(tree.subscription_count("a"), 2);

    assert_eq!(tree.unsubscribe_all("a"), 2);
    assert_eq!(tree.delivery_set(&addr("/bla")), vec!["b"]);
    assert_eq!(tree.subscription_count("a"), 0);
    assert_eq!(tree.unsubscribe_all("a"), 0);
}

#[test]
fn test_retained_last_write_wins() {
    let mut tree = NamespaceTree::new();
    tree.retain(&addr("/bla"), vec![Arg::Int(1)]);
    tree.retain(&addr("/bla"), vec![Arg::Int(2), Arg::String("b".into())]);

    assert_eq!(
        tree.retained(&addr("/bla")),
        vec![Arg::Int(2), Arg::String("b".into())]
    );
}

#[test]
fn test_retained_is_per_exact_address() {
    let mut tree = NamespaceTree::new();
    tree.retain(&addr("/bla/bli"), vec![Arg::Int(1)]);

    assert!(tree.retained(&addr("/bla")).is_empty());
    assert!(tree.retained(&addr("/bla/bli/blob")).is_empty());
    assert_eq!(tree.retained(&addr("/bla/bli/")), vec![Arg::Int(1)]);
}

#[test]
fn test_never_sent_same_as_empty() {
    let mut tree = NamespaceTree::new();
    tree.retain(&addr("/empty"), vec![]);

    assert_eq!(tree.retained(&addr("/empty")), tree.retained(&addr("/never")));
    assert!(tree.lookup(&addr("/never")).is_none());
}

#[test]
fn test_root_retains() {
    let mut tree = NamespaceTree::new();
    tree.retain(&addr("/"), vec![Arg::Bool(true)]);
    assert_eq!(tree.retained(&addr("/")), vec![Arg::Bool(true)]);
}
