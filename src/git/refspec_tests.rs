#![expect(clippy::unwrap_used, reason = "tests panic on failure")]

use rstest::rstest;

use super::error::GitError;
use super::refspec::Refspec;

#[rstest]
#[case("refs/heads/master", "refs/heads/master", "refs/heads/master")]
#[case(
    "refs/heads/master:refs/origin/master",
    "refs/heads/master",
    "refs/origin/master"
)]
#[case("refs/heads/*:refs/origin/*", "refs/heads/master", "refs/origin/master")]
#[case(
    "refs/heads/*:refs/origin/*",
    "refs/heads/extra/master",
    "refs/origin/extra/master"
)]
#[case(
    "*/heads/master:*/origin/heads/master",
    "refs/heads/master",
    "refs/origin/heads/master"
)]
#[case(
    "refs/*/master:refs/origin/*/master",
    "refs/heads/master",
    "refs/origin/heads/master"
)]
fn convert_maps_origin_ref_to_destination(
    #[case] refspec: &str,
    #[case] origin_ref: &str,
    #[case] expected: &str,
) {
    let parsed = Refspec::parse(refspec).unwrap();
    assert!(parsed.matches_origin(origin_ref));
    assert_eq!(parsed.convert(origin_ref).unwrap(), expected);
}

#[rstest]
fn convert_rejects_mismatched_ref() {
    let refspec = Refspec::parse("refs/heads/*:refs/origin/*").unwrap();
    assert!(!refspec.matches_origin("refs/tags/v1"));
    let err = refspec.convert("refs/tags/v1").unwrap_err();
    assert!(matches!(err, GitError::Validation { .. }));
}

#[rstest]
fn parse_without_destination_mirrors_origin() {
    let refspec = Refspec::parse("refs/heads/master").unwrap();
    assert_eq!(refspec.origin(), "refs/heads/master");
    assert_eq!(refspec.destination(), "refs/heads/master");
    assert!(!refspec.is_allow_no_fast_forward());
}

#[rstest]
fn parse_leading_plus_allows_non_fast_forward() {
    let refspec = Refspec::parse("+refs/heads/master:refs/origin/master").unwrap();
    assert!(refspec.is_allow_no_fast_forward());
    assert_eq!(
        refspec.to_string(),
        "+refs/heads/master:refs/origin/master"
    );
}

#[rstest]
fn with_allow_no_fast_forward_sets_flag() {
    let refspec = Refspec::parse("refs/heads/master").unwrap();
    assert!(refspec.with_allow_no_fast_forward().is_allow_no_fast_forward());
}

#[rstest]
fn multiple_colons_are_rejected() {
    let err = Refspec::parse("refs/heads/a:refs/heads/b:refs/heads/c").unwrap_err();
    assert!(err.to_string().contains("Multiple ':' found"));
}

#[rstest]
fn wildcard_in_only_one_half_is_rejected() {
    let err = Refspec::parse("refs/heads/*:refs/origin/master").unwrap_err();
    assert!(
        err.to_string()
            .contains("Wildcard only used in one part of the refspec")
    );
}

#[rstest]
#[case("")]
#[case("1234")]
#[case("refs/heads/mas ter")]
#[case("refs/heads/a..b")]
#[case("refs/heads/master.")]
#[case("refs/heads/master.lock")]
#[case("refs/*/a/*:refs/*/a/*")]
fn malformed_refspecs_are_rejected(#[case] refspec: &str) {
    assert!(Refspec::parse(refspec).is_err(), "accepted: {refspec}");
}

#[rstest]
fn invert_swaps_halves() {
    let refspec = Refspec::parse("refs/heads/*:refs/origin/*").unwrap();
    let inverted = refspec.invert();
    assert_eq!(inverted.origin(), "refs/origin/*");
    assert_eq!(inverted.destination(), "refs/heads/*");
}

#[rstest]
fn origin_to_origin_and_destination_to_destination() {
    let refspec = Refspec::parse("refs/heads/master:refs/origin/master").unwrap();
    let origin = refspec.origin_to_origin();
    assert_eq!(origin.to_string(), "refs/heads/master:refs/heads/master");
    let destination = refspec.destination_to_destination();
    assert_eq!(
        destination.to_string(),
        "refs/origin/master:refs/origin/master"
    );
}
