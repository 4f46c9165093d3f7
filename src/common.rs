//! The JSON wire format downstream catalog tools consume.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    rmp::RatingTable,
    scraper::{Course, RawData},
};

/// One course as written to the output array. `data` holds the extra
/// fields as a JSON-encoded object, `"{}"` when there are none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub id: u64,
    pub subject: String,
    pub course: u32,
    pub name: String,
    pub data: String,
}

impl CourseRecord {
    fn new(course: &Course, raw_data: RawData) -> Self {
        let data: Map<String, Value> = raw_data.into_iter().collect();
        CourseRecord {
            id: course.id,
            subject: course.subject.clone(),
            course: course.course_number,
            name: course.name.clone(),
            data: Value::Object(data).to_string(),
        }
    }
}

impl From<&Course> for CourseRecord {
    fn from(course: &Course) -> Self {
        CourseRecord::new(course, course.raw_data.clone())
    }
}

impl TryFrom<CourseRecord> for Course {
    type Error = serde_json::Error;

    fn try_from(record: CourseRecord) -> Result<Self, Self::Error> {
        let raw_data = if record.data.trim().is_empty() {
            RawData::new()
        } else {
            serde_json::from_str(&record.data)?
        };
        Ok(Course {
            id: record.id,
            subject: record.subject,
            course_number: record.course,
            name: record.name,
            raw_data,
        })
    }
}

/// Converts courses to wire records, attaching any known instructor
/// ratings under `data.ratings`. The courses themselves are untouched.
pub fn to_records(courses: &[Course], ratings: Option<&RatingTable>) -> Vec<CourseRecord> {
    courses
        .iter()
        .map(|course| match ratings {
            Some(ratings) => CourseRecord::new(course, with_ratings(&course.raw_data, ratings)),
            None => CourseRecord::from(course),
        })
        .collect()
}

pub fn to_json(records: &[CourseRecord], pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(records)
    } else {
        serde_json::to_string(records)
    }
}

/// Reads a serialized course array back
pub fn from_json(json: &str) -> serde_json::Result<Vec<Course>> {
    serde_json::from_str::<Vec<CourseRecord>>(json)?
        .into_iter()
        .map(Course::try_from)
        .collect()
}

/// Instructor names a course lists, from either the structured
/// `instructors` array or a plain `instructor(s)` column.
///
/// An `instructors` string is comma separated like Banner's meeting table.
/// A single `instructor` cell may be written surname first (`Doe, Jane`),
/// so it only splits on `;` and ` and `.
pub fn instructor_names(raw_data: &RawData) -> Vec<String> {
    ["instructors", "instructor"]
        .iter()
        .filter_map(|key| raw_data.get(*key).map(|value| (*key, value)))
        .flat_map(|(key, value)| match value {
            Value::Array(entries) => entries
                .iter()
                .filter_map(|e| e.get("name").and_then(Value::as_str).or_else(|| e.as_str()))
                .map(str::to_string)
                .collect::<Vec<_>>(),
            Value::String(list) if key == "instructors" => list.split(',').map(|n| n.trim().to_string()).collect(),
            Value::String(cell) => cell
                .split(';')
                .flat_map(|part| part.split(" and "))
                .map(|n| n.trim().to_string())
                .collect(),
            _ => Vec::new(),
        })
        .filter(|name| !name.is_empty() && name != "TBA")
        .unique()
        .collect()
}

fn with_ratings(raw_data: &RawData, ratings: &RatingTable) -> RawData {
    let rated: Map<String, Value> = instructor_names(raw_data)
        .into_iter()
        .filter_map(|name| {
            let info = ratings.lookup(&name)?;
            let info = serde_json::to_value(info).ok()?;
            Some((name, info))
        })
        .collect();

    let mut raw_data = raw_data.clone();
    if !rated.is_empty() {
        raw_data.insert("ratings".to_string(), Value::Object(rated));
    }
    raw_data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rmp::RmpInfo;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn course(raw_data: Value) -> Course {
        Course {
            id: 1,
            subject: "CS".to_string(),
            course_number: 101,
            name: "Introduction to Computer Science".to_string(),
            raw_data: serde_json::from_value(raw_data).unwrap(),
        }
    }

    #[test]
    fn empty_data_is_an_empty_object() {
        let record = CourseRecord::from(&course(json!({})));
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "id": 1,
                "subject": "CS",
                "course": 101,
                "name": "Introduction to Computer Science",
                "data": "{}"
            })
        );
    }

    #[test]
    fn blank_data_reads_as_empty() {
        let json = r#"[{"id":3,"subject":"MA","course":16100,"name":"Calculus","data":""}]"#;
        let courses = from_json(json).unwrap();
        assert!(courses[0].raw_data.is_empty());
    }

    #[test]
    fn collects_instructor_names() {
        let raw: RawData = serde_json::from_value(json!({
            "instructors": [{ "name": "Jane Doe", "primary": true }, { "name": "TBA", "primary": false }],
            "instructor": "John Roe; Jane Doe"
        }))
        .unwrap();
        assert_eq!(instructor_names(&raw), vec!["Jane Doe", "John Roe"]);
    }

    #[test]
    fn instructor_cell_keeps_surname_first_names_whole() {
        let raw: RawData = serde_json::from_value(json!({ "instructor": "Doe, Jane and Roe, John" })).unwrap();
        assert_eq!(instructor_names(&raw), vec!["Doe, Jane", "Roe, John"]);

        let banner: RawData = serde_json::from_value(json!({ "instructors": "Jane Doe, John Roe" })).unwrap();
        assert_eq!(instructor_names(&banner), vec!["Jane Doe", "John Roe"]);
    }

    #[test]
    fn ratings_join_only_touches_output() {
        let info = RmpInfo {
            avg_difficulty: 2.5,
            avg_rating: 4.5,
            rmp_url: "https://www.ratemyprofessors.com/professor/7".to_string(),
            num_ratings: 40,
            would_take_again_percent: 92.5,
        };
        let ratings: RatingTable = [("Doe, Jane", info)].into_iter().collect();
        let courses = vec![course(json!({
            "instructors": [{ "name": "Jane Doe", "primary": true }, { "name": "John Roe", "primary": false }]
        }))];

        let records = to_records(&courses, Some(&ratings));
        let data: Value = serde_json::from_str(&records[0].data).unwrap();
        assert_eq!(data["ratings"]["Jane Doe"]["avgRating"], json!(4.5));
        assert!(data["ratings"].get("John Roe").is_none());
        assert!(!courses[0].raw_data.contains_key("ratings"));
    }

    #[test]
    fn no_ratings_leaves_data_alone() {
        let courses = vec![course(json!({ "crn": 12345 }))];
        let ratings = RatingTable::default();
        assert_eq!(to_records(&courses, Some(&ratings)), to_records(&courses, None));
    }
}
