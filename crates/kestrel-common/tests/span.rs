use super::*;

#[test]
fn test_span_basics() {
    let span = Span::new(10, 20);
    assert_eq!(span.start, 10);
    assert_eq!(span.end, 20);
    assert_eq!(span.len(), 10);
    assert!(!span.is_empty());
}

#[test]
fn test_span_at() {
    let span = Span::at(42);
    assert!(span.is_empty());
    assert_eq!(span.len(), 0);
}

#[test]
fn test_span_contains() {
    let span = Span::new(10, 20);
    assert!(span.contains(10));
    assert!(span.contains(19));
    assert!(!span.contains(9));
    assert!(!span.contains(20));
}

#[test]
fn test_span_merge() {
    let merged = Span::new(10, 20).merge(Span::new(15, 30));
    assert_eq!(merged, Span::new(10, 30));
}

#[test]
fn test_span_slice() {
    let text = "hello world";
    assert_eq!(Span::new(0, 5).slice(text), "hello");
    assert_eq!(Span::new(6, 11).slice(text), "world");
    // Out-of-bounds clamps instead of panicking
    assert_eq!(Span::new(6, 99).slice(text), "world");
    assert_eq!(Span::DUMMY.slice(text), "");
}

#[test]
fn test_dummy_span() {
    assert!(Span::DUMMY.is_dummy());
    assert!(!Span::new(0, 1).is_dummy());
}
