//! Surveys, publishing and response collection.

use crate::context::SyncContext;
use crate::http::{ApiRequest, ApiResponse};
use crate::resource::{decode_list, record_path, Resource, ResourceSpec, Saved};
use meridian_cache::{InvalidationPlan, Mutation, MutationSpec, Query};
use meridian_core::{FilterParams, KeyFactory};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    pub id: String,
    pub title: String,
    pub status: String,
    #[serde(default)]
    pub response_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSurvey {
    pub title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SurveyChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<Value>>,
}

pub struct SurveySpec;

impl ResourceSpec for SurveySpec {
    type Record = Survey;
    type Create = NewSurvey;
    type Update = SurveyChanges;

    const NAMESPACE: &'static str = "surveys";
    const PATH: &'static str = "/surveys";
    const LABEL: &'static str = "Survey";

    fn record_id(record: &Survey) -> String {
        record.id.clone()
    }
}

pub type Surveys = Resource<SurveySpec>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub id: String,
    pub survey_id: String,
    pub answers: Value,
    #[serde(default)]
    pub submitted_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSubmission {
    #[serde(skip)]
    pub survey_id: String,
    pub answers: Value,
}

pub fn response_keys() -> KeyFactory {
    SurveySpec::keys().scoped("responses")
}

fn survey_filter(survey_id: &str) -> FilterParams {
    FilterParams::new().with("survey_id", survey_id)
}

fn responses_path(survey_id: &str) -> String {
    format!("{}/responses", record_path(SurveySpec::PATH, survey_id))
}

impl Resource<SurveySpec> {
    pub fn publish(&self) -> Mutation<String, Saved<Survey>> {
        let keys = self.keys().clone();
        let spec = MutationSpec::new(
            "surveys.publish",
            "Survey published",
            "Failed to publish survey",
        )
        .invalidates(move |id: &String, _: &Saved<Survey>| {
            InvalidationPlan::new()
                .exact_refetch(keys.detail(id.clone()))
                .subtree(keys.lists())
        })
        .server_message(|saved: &Saved<Survey>| saved.message.clone());

        self.context().mutation(
            spec,
            |id: &String| {
                let path = format!("{}/publish", record_path(SurveySpec::PATH, id));
                Ok(ApiRequest::post(path))
            },
            |_: &String, response: &ApiResponse| Saved::from_response(response),
        )
    }

    pub fn responses(&self, survey_id: &str) -> Query<Vec<SurveyResponse>> {
        let options = self
            .context()
            .cache()
            .default_options()
            .enabled(!survey_id.is_empty());
        self.context().fetch(
            response_keys().list(&survey_filter(survey_id)),
            options,
            ApiRequest::get(responses_path(survey_id)),
            decode_list::<SurveyResponse>,
        )
    }

    pub fn submit_response(&self) -> Mutation<ResponseSubmission, Saved<SurveyResponse>> {
        let spec = MutationSpec::new(
            "surveys.submit_response",
            "Response submitted",
            "Failed to submit response",
        )
        .invalidates(|submission: &ResponseSubmission, _: &Saved<SurveyResponse>| {
            let responses = response_keys().list(&survey_filter(&submission.survey_id));
            InvalidationPlan::new().subtree(responses)
        })
        .server_message(|saved: &Saved<SurveyResponse>| saved.message.clone());

        self.context().mutation(
            spec,
            |submission: &ResponseSubmission| {
                ApiRequest::post(responses_path(&submission.survey_id)).with_json(submission)
            },
            |_: &ResponseSubmission, response: &ApiResponse| Saved::from_response(response),
        )
    }
}

impl SyncContext {
    pub fn surveys(&self) -> Surveys {
        self.resource::<SurveySpec>()
    }
}
