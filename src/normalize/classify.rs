//! Keyword classification: educational-content filter, program kind and
//! delivery mode.

/// Vocabulary used to decide whether a page or list item is about an
/// educational offering at all.
const EDU_WORDS: &[&str] = &[
    "course", "class", "workshop", "training", "tutorial", "webinar", "lecture",
    "program", "degree", "diploma", "certificate", "bootcamp", "seminar", "learn",
    "education", "study", "mooc", "lesson", "curriculum", "module",
];

const SEMINAR_WORDS: &[&str] = &["webinar", "seminar", "workshop", "conference"];
const VIDEO_WORDS: &[&str] = &["youtube.com", "vimeo.com", "lecture", "video"];
const COURSE_WORDS: &[&str] = &["course", "bootcamp", "mooc", "degree", "diploma", "certificate"];

const ONLINE_WORDS: &[&str] = &["online", "virtual", "remote"];
const IN_PERSON_WORDS: &[&str] = &["inperson", "in-person", "campus", "onsite", "on-site", "classroom"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    Course,
    Seminar,
    Video,
    Other,
}

impl ProgramKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgramKind::Course => "Course",
            ProgramKind::Seminar => "Seminar",
            ProgramKind::Video => "Video",
            ProgramKind::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Online,
    InPerson,
    Unknown,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Online => "Online",
            Mode::InPerson => "In-person",
            Mode::Unknown => "Unknown",
        }
    }
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// Case-insensitive substring test against the educational vocabulary.
pub fn looks_educational(text: &str) -> bool {
    contains_any(&text.to_lowercase(), EDU_WORDS)
}

/// Classify free text into a program kind. Seminar keywords outrank
/// video keywords, which outrank course keywords.
pub fn classify_kind(text: &str) -> ProgramKind {
    let t = text.to_lowercase();
    if contains_any(&t, SEMINAR_WORDS) {
        ProgramKind::Seminar
    } else if contains_any(&t, VIDEO_WORDS) {
        ProgramKind::Video
    } else if contains_any(&t, COURSE_WORDS) {
        ProgramKind::Course
    } else {
        ProgramKind::Other
    }
}

/// Collapse raw delivery-mode text to one of the three modes.
pub fn classify_mode(raw: &str) -> Mode {
    let t = raw.to_lowercase();
    if contains_any(&t, ONLINE_WORDS) {
        Mode::Online
    } else if contains_any(&t, IN_PERSON_WORDS) {
        Mode::InPerson
    } else {
        Mode::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn educational_filter() {
        assert!(looks_educational("Free Python course for beginners"));
        assert!(looks_educational("EVENING CLASSES"));
        assert!(!looks_educational("Buy cheap flights to Sydney"));
    }

    #[test]
    fn kind_priority_seminar_over_video_over_course() {
        assert_eq!(classify_kind("video workshop"), ProgramKind::Seminar);
        assert_eq!(classify_kind("recorded lecture for this course"), ProgramKind::Video);
        assert_eq!(classify_kind("data science bootcamp"), ProgramKind::Course);
        assert_eq!(classify_kind("annual gala dinner"), ProgramKind::Other);
    }

    #[test]
    fn mode_keyword_families() {
        assert_eq!(classify_mode("Remote session"), Mode::Online);
        assert_eq!(classify_mode("MixedVirtualAttendance"), Mode::Online);
        assert_eq!(classify_mode("On-campus only"), Mode::InPerson);
        assert_eq!(classify_mode("Hybrid flexible"), Mode::Unknown);
        assert_eq!(classify_mode(""), Mode::Unknown);
    }

    #[test]
    fn offline_attendance_is_not_online() {
        assert_eq!(classify_mode("OfflineEventAttendanceMode"), Mode::Unknown);
    }
}
