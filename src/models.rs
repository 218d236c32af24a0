use serde::{de, Deserialize, Deserializer, Serialize};

/// Salary sentinel the analysis pipeline writes when no estimate exists.
pub const SALARY_NOT_DISCLOSED: &str = "Not Disclosed";

/// Scores at or above this are shown as a strong match.
pub const STRONG_MATCH_SCORE: u8 = 80;

pub const MAX_MATCH_SCORE: u8 = 100;

fn not_disclosed() -> String {
    SALARY_NOT_DISCLOSED.to_string()
}

// Explicit nulls decode like missing fields.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn salary_or_sentinel<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(not_disclosed))
}

fn match_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let score = Option::<u64>::deserialize(deserializer)?.unwrap_or(0);
    if score > u64::from(MAX_MATCH_SCORE) {
        return Err(de::Error::custom(format!(
            "match score {} is above {}",
            score, MAX_MATCH_SCORE
        )));
    }
    Ok(score as u8)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAnalysis {
    #[serde(default, alias = "matchScore", deserialize_with = "match_score")]
    pub match_score: u8, // 0..=100
    #[serde(default = "not_disclosed", alias = "salaryEstimate", deserialize_with = "salary_or_sentinel")]
    pub salary_estimate: String, // "Not Disclosed" when unknown
    #[serde(default, alias = "shareMessage", deserialize_with = "null_as_default")]
    pub share_message: String,
    #[serde(default, alias = "skillGap", deserialize_with = "null_as_default")]
    pub skill_gap: Vec<String>,
    // Only present in some payload versions
    #[serde(default, alias = "isSuitableForFresher", skip_serializing_if = "Option::is_none")]
    pub is_suitable_for_fresher: Option<bool>,
    #[serde(default, alias = "coverLetterHook", skip_serializing_if = "Option::is_none")]
    pub cover_letter_hook: Option<String>,
}

impl Default for JobAnalysis {
    fn default() -> Self {
        Self {
            match_score: 0,
            salary_estimate: not_disclosed(),
            share_message: String::new(),
            skill_gap: Vec::new(),
            is_suitable_for_fresher: None,
            cover_letter_hook: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTier {
    Strong,
    Fair,
}

impl JobAnalysis {
    pub fn has_salary(&self) -> bool {
        self.salary_estimate != SALARY_NOT_DISCLOSED
    }

    pub fn has_skill_gap(&self) -> bool {
        !self.skill_gap.is_empty()
    }

    pub fn tier(&self) -> ScoreTier {
        if self.match_score >= STRONG_MATCH_SCORE {
            ScoreTier::Strong
        } else {
            ScoreTier::Fair
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String, // records without one are skipped by the feed decoder
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub company: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub site: String, // "linkedin", "indeed", "zip_recruiter", ...
    #[serde(default, alias = "foundAt", skip_serializing_if = "Option::is_none")]
    pub found_at: Option<String>, // RFC 3339 or "YYYY-MM-DD HH:MM"
    #[serde(default, alias = "datePosted", skip_serializing_if = "Option::is_none")]
    pub date_posted: Option<String>,
    #[serde(default, alias = "jobUrl", deserialize_with = "null_as_default")]
    pub job_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub analysis: JobAnalysis,
}
