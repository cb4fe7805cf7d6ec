//! Version parsing and ordering properties.

use stepledger::version::{sort_natural, sort_semantic};
use stepledger::{Maturity, NewestFirst, Version};

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

const MIXED: [&str; 9] = [
    "2.3.1-SNAPSHOT",
    "2.3.1-beta1",
    "2.3.1-beta2",
    "2.3.1-M1",
    "2.3.1-alpha2",
    "2.3.1-RC1",
    "2.3.1",
    "2.3",
    "2.4.6",
];

#[test]
fn test_canonical_rendering() {
    assert_eq!(v("1.0").parsed_version(), "1.0.0");
    assert_eq!(v("1.1-SNAPSHOT").parsed_version(), "1.1.0-SNAPSHOT");
    assert_eq!(v("2.3.14").parsed_version(), "2.3.14");

    let alpha = v("1.0-alpha");
    assert_eq!(alpha.maturity(), Maturity::Alpha);
    assert_eq!(alpha.type_version(), 1);

    let rc = v("2.1.2-RC3");
    assert_eq!(rc.maturity(), Maturity::ReleaseCandidate);
    assert_eq!(rc.type_version(), 3);
}

#[test]
fn test_unparseable_input() {
    assert!(Version::parse("aaaa").is_err());
    assert!("aaaa".parse::<Version>().is_err());
    // Surrounding whitespace is not part of the grammar.
    for padded in [" 1.0", "1.0 ", "1.0\n", "\t2.3.1-RC1"] {
        assert!(Version::parse(padded).is_err(), "{padded:?}");
    }
}

#[test]
fn test_natural_order_lists_newest_first() {
    let mut versions: Vec<Version> = MIXED.iter().map(|s| v(s)).collect();
    sort_natural(&mut versions);

    let rendered: Vec<String> = versions.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        vec![
            "2.4.6",
            "2.3.1",
            "2.3.1-SNAPSHOT",
            "2.3.1-RC1",
            "2.3.1-beta2",
            "2.3.1-beta1",
            "2.3.1-alpha2",
            "2.3.1-M1",
            "2.3.0",
        ]
    );
}

#[test]
fn test_newest_first_wrapper_matches_natural_order() {
    let mut wrapped: Vec<NewestFirst> = MIXED.iter().map(|s| NewestFirst(v(s))).collect();
    wrapped.sort();
    let mut plain: Vec<Version> = MIXED.iter().map(|s| v(s)).collect();
    sort_natural(&mut plain);

    let unwrapped: Vec<Version> = wrapped.into_iter().map(|w| w.0).collect();
    assert_eq!(unwrapped, plain);
}

#[test]
fn test_semantic_order_is_exact_reverse() {
    let mut natural: Vec<Version> = MIXED.iter().map(|s| v(s)).collect();
    sort_natural(&mut natural);
    let mut semantic: Vec<Version> = MIXED.iter().map(|s| v(s)).collect();
    sort_semantic(&mut semantic);

    natural.reverse();
    assert_eq!(natural, semantic);
}

#[test]
fn test_is_newer_and_is_older() {
    assert!(v("1.1").is_newer(&v("1.1-alpha1")));
    assert!(v("1.1").is_newer(&v("1.1-RC5")));
    assert!(!v("1.0").is_newer(&v("1.0.1")));

    let pairs = [("1.1", "1.1-alpha1"), ("1.1", "1.1-RC5"), ("1.0", "1.0.1"), ("2.0", "2.0")];
    for (a, b) in pairs {
        let (a, b) = (v(a), v(b));
        assert_eq!(a.is_older(&b), b.is_newer(&a), "{a} vs {b}");
        assert_eq!(a.is_newer(&b), b.is_older(&a), "{a} vs {b}");
    }
}
