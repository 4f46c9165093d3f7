use pretty_assertions::assert_eq;
use sched_scraper::{
    common::{from_json, to_json, to_records, CourseRecord},
    rmp::{RatingTable, RmpInfo},
    scraper::extract_courses,
};
use serde_json::{json, Value};

const BANNER_PAGE: &str = include_str!("fixtures/banner_schedule.html");

#[test]
fn wire_format_field_names_and_shapes() {
    let courses = extract_courses(BANNER_PAGE).courses;
    let json = to_json(&to_records(&courses, None), false).unwrap();
    let value: Value = serde_json::from_str(&json).unwrap();

    let first = &value[0];
    let mut keys: Vec<&str> = first.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["course", "data", "id", "name", "subject"]);
    assert_eq!(first["id"], json!(1));
    assert_eq!(first["subject"], json!("CS"));
    assert_eq!(first["course"], json!(18000));

    let data: Value = serde_json::from_str(first["data"].as_str().unwrap()).unwrap();
    assert_eq!(data["crn"], json!(12345));
}

#[test]
fn round_trips_through_json() {
    let courses = extract_courses(BANNER_PAGE).courses;
    for pretty in [false, true] {
        let json = to_json(&to_records(&courses, None), pretty).unwrap();
        assert_eq!(from_json(&json).unwrap(), courses);
    }
}

#[test]
fn placeholder_record_shape_is_unchanged() {
    let record = CourseRecord {
        id: 1,
        subject: "CS".to_string(),
        course: 101,
        name: "Introduction to Computer Science".to_string(),
        data: "{}".to_string(),
    };
    assert_eq!(
        to_json(&[record], false).unwrap(),
        r#"[{"id":1,"subject":"CS","course":101,"name":"Introduction to Computer Science","data":"{}"}]"#
    );
}

#[test]
fn ratings_are_joined_by_instructor_name() {
    let courses = extract_courses(BANNER_PAGE).courses;
    let ratings: RatingTable = [(
        "Doe, Jane",
        RmpInfo {
            avg_difficulty: 3.4,
            avg_rating: 4.2,
            rmp_url: "https://www.ratemyprofessors.com/professor/42".to_string(),
            num_ratings: 87,
            would_take_again_percent: 76.0,
        },
    )]
    .into_iter()
    .collect();

    let records = to_records(&courses, Some(&ratings));
    let first: Value = serde_json::from_str(&records[0].data).unwrap();
    let second: Value = serde_json::from_str(&records[1].data).unwrap();

    assert_eq!(first["ratings"]["Jane A. Doe"]["numRatings"], json!(87));
    assert!(second.get("ratings").is_none());
    assert_eq!(records[1], CourseRecord::from(&courses[1]));
}

#[test]
fn ratings_join_listing_rows_with_surname_first_instructors() {
    let html = r#"<table>
<tr><th>Subject</th><th>Number</th><th>Title</th><th>Instructor</th></tr>
<tr><td>ENGL</td><td>10600</td><td>First-Year Composition</td><td>Doe, Jane</td></tr>
</table>"#;
    let courses = extract_courses(html).courses;
    let ratings: RatingTable = [(
        "Jane Doe",
        RmpInfo {
            avg_difficulty: 2.1,
            avg_rating: 4.8,
            rmp_url: "https://www.ratemyprofessors.com/professor/9".to_string(),
            num_ratings: 12,
            would_take_again_percent: 91.0,
        },
    )]
    .into_iter()
    .collect();

    let records = to_records(&courses, Some(&ratings));
    let data: Value = serde_json::from_str(&records[0].data).unwrap();
    assert_eq!(data["instructor"], json!("Doe, Jane"));
    assert_eq!(data["ratings"]["Doe, Jane"]["numRatings"], json!(12));
}
