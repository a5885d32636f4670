//! Sentence builders for people and place enrichment.

use crate::error::{Error, Result};
use crate::models::Place;

/// Split a comma-separated people string into trimmed, non-empty names.
pub fn split_people_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

/// Describe the named people identified in a photo.
///
/// Callers must pass at least one name.
pub fn describe_people_in_scene(people: &[String]) -> Result<String> {
    if people.is_empty() {
        return Err(Error::InvalidInput(
            "cannot describe a scene without people".to_string(),
        ));
    }
    Ok(format!("The scene contains {}.", join_natural(people)))
}

/// Describe where a photo was taken from reverse-geocoded places.
///
/// Returns `None` when there are no places to describe.
pub fn describe_geo_location(places: &[Place]) -> Option<String> {
    let names: Vec<String> = places
        .iter()
        .map(|place| {
            [
                place.toponym_name.as_str(),
                place.admin_name2.as_str(),
                place.admin_name1.as_str(),
            ]
            .into_iter()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
        })
        .filter(|name| !name.is_empty())
        .collect();

    if names.is_empty() {
        return None;
    }
    Some(format!("The scene takes place in {}.", join_natural(&names)))
}

/// `a`, `a and b`, `a, b and c`.
fn join_natural(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [head @ .., last] => format!("{} and {}", head.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(toponym: &str, county: &str, state: &str) -> Place {
        Place {
            toponym_name: toponym.to_string(),
            admin_name2: county.to_string(),
            admin_name1: state.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_split_people_names_trims_and_drops_empty() {
        assert_eq!(
            split_people_names(" Alice, Bob ,,Carol "),
            vec!["Alice", "Bob", "Carol"]
        );
        assert!(split_people_names(" , ").is_empty());
    }

    #[test]
    fn test_describe_single_person() {
        let out = describe_people_in_scene(&["Alice".to_string()]).unwrap();
        assert_eq!(out, "The scene contains Alice.");
    }

    #[test]
    fn test_describe_two_people() {
        let out = describe_people_in_scene(&["Alice".to_string(), "Bob".to_string()]).unwrap();
        assert_eq!(out, "The scene contains Alice and Bob.");
    }

    #[test]
    fn test_describe_many_people() {
        let names: Vec<String> = ["Alice", "Bob", "Carol"].iter().map(|s| s.to_string()).collect();
        let out = describe_people_in_scene(&names).unwrap();
        assert_eq!(out, "The scene contains Alice, Bob and Carol.");
    }

    #[test]
    fn test_describe_people_is_deterministic_and_non_empty() {
        for n in 1..6 {
            let names: Vec<String> = (0..n).map(|i| format!("Person{i}")).collect();
            let first = describe_people_in_scene(&names).unwrap();
            let second = describe_people_in_scene(&names).unwrap();
            assert_eq!(first, second);
            assert!(!first.is_empty());
            for name in &names {
                assert!(first.contains(name.as_str()));
            }
        }
    }

    #[test]
    fn test_describe_no_people_is_rejected() {
        assert!(matches!(
            describe_people_in_scene(&[]),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_describe_single_place() {
        let out = describe_geo_location(&[place("La Jolla", "San Diego County", "California")]);
        assert_eq!(
            out.as_deref(),
            Some("The scene takes place in La Jolla, San Diego County, California.")
        );
    }

    #[test]
    fn test_describe_multiple_places() {
        let out = describe_geo_location(&[
            place("La Jolla", "San Diego County", "California"),
            place("Pacific Beach", "", "California"),
        ])
        .unwrap();
        assert_eq!(
            out,
            "The scene takes place in La Jolla, San Diego County, California \
             and Pacific Beach, California."
        );
    }

    #[test]
    fn test_describe_no_places() {
        assert!(describe_geo_location(&[]).is_none());
        assert!(describe_geo_location(&[place(" ", "", "")]).is_none());
    }
}
