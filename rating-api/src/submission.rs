//! The rating submission workflow.
//!
//! A submission runs as one linear sequence of remote calls: authenticate,
//! resolve the repository, then update the rating, the site totals and the
//! repository aggregate. Writes are not transactional. Every write is logged
//! with its document id so that a partially applied submission can be
//! reconciled by hand.

use crate::config::CountingPolicy;
use crate::github::{CodeHost, CodeHostError};
use crate::metrics_defs::{
    RATING_CREATED, RATING_REJECTED, RATING_SUBMIT_DURATION, RATING_SUBMITTED, RATING_UPDATED,
    REPO_CREATED,
};
use crate::session::SessionProvider;
use crate::store::{
    Collection, Document, DocumentStore, Query, StoreError, list_all, to_fields,
};
use crate::types::{AppTotals, RatingInput, RatingRecord, RepoAggregate, RepoMetadata, RepoTarget};
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(thiserror::Error, Debug)]
pub enum SubmitError {
    #[error("invalid session: {0}")]
    InvalidSession(String),
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Invalid rating")]
    InvalidRating,
    #[error("could not fetch repository metadata: {0}")]
    CodeHost(#[from] CodeHostError),
    #[error("document store error: {0}")]
    Store(#[from] StoreError),
    #[error("app totals document is missing")]
    MissingAppTotals,
}

impl SubmitError {
    /// Reason tag for submissions turned away before any write.
    pub fn rejection_reason(&self) -> Option<&'static str> {
        match self {
            SubmitError::InvalidSession(_) => Some("invalid_session"),
            SubmitError::InvalidUrl => Some("invalid_url"),
            SubmitError::InvalidRating => Some("invalid_rating"),
            SubmitError::CodeHost(_) | SubmitError::Store(_) | SubmitError::MissingAppTotals => {
                None
            }
        }
    }
}

/// One rating as received from a client. Headers are optional because their
/// absence is an authentication failure, not a malformed request.
#[derive(Clone, Debug)]
pub struct RatingSubmission {
    pub session_id: Option<String>,
    pub jwt: Option<String>,
    pub url: String,
    pub rating: RatingInput,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RatingUpsert {
    Created,
    Updated { previous: i64 },
}

pub struct RatingService {
    sessions: Arc<dyn SessionProvider>,
    code_host: Arc<dyn CodeHost>,
    store: Arc<dyn DocumentStore>,
    policy: CountingPolicy,
}

impl RatingService {
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        code_host: Arc<dyn CodeHost>,
        store: Arc<dyn DocumentStore>,
        policy: CountingPolicy,
    ) -> Self {
        RatingService {
            sessions,
            code_host,
            store,
            policy,
        }
    }

    /// Records a rating and refreshes the derived statistics.
    ///
    /// Returns the repository metadata as fetched from the code host.
    pub async fn submit(&self, submission: RatingSubmission) -> Result<RepoMetadata, SubmitError> {
        let start = Instant::now();
        let result = self.process(submission).await;
        histogram!(RATING_SUBMIT_DURATION).record(start.elapsed().as_secs_f64());

        match &result {
            Ok(_) => counter!(RATING_SUBMITTED).increment(1),
            Err(e) => {
                if let Some(reason) = e.rejection_reason() {
                    counter!(RATING_REJECTED, "reason" => reason).increment(1);
                }
            }
        }

        result
    }

    async fn process(&self, submission: RatingSubmission) -> Result<RepoMetadata, SubmitError> {
        info!(url = %submission.url, rating = ?submission.rating, "Rating received");

        let (username, access_token) = self
            .authenticate(submission.session_id.as_deref(), submission.jwt.as_deref())
            .await
            .inspect_err(|e| warn!(url = %submission.url, error = %e, "Rejecting rating"))?;
        info!(%username, url = %submission.url, "User submitted rating");

        let target = RepoTarget::parse(&submission.url).ok_or_else(|| {
            warn!(%username, url = %submission.url, "Rejecting rating for malformed URL");
            SubmitError::InvalidUrl
        })?;
        let rating = submission.rating.to_rating().ok_or_else(|| {
            warn!(%username, rating = ?submission.rating, "Rejecting unparseable rating");
            SubmitError::InvalidRating
        })?;

        let metadata: RepoMetadata = self
            .code_host
            .get_repo(&target.path, &access_token)
            .await?
            .into();
        info!(name = %metadata.name, owner = %metadata.owner, "Repository found on code host");

        let totals = self.load_app_totals().await?;
        let upsert = self.upsert_rating(&username, &target.url, rating).await?;
        self.count_rating(&totals.id, rating, upsert).await?;

        if self.upsert_repo(&target.url, &metadata, rating).await? {
            info!(totals_id = %totals.id, "Incrementing app total repos");
            self.store
                .increment(Collection::AppTotals, &totals.id, AppTotals::REPOS, 1.0)
                .await?;
            counter!(REPO_CREATED).increment(1);
        }

        Ok(metadata)
    }

    /// Resolves the rater's login. Any failure along the way is an invalid session.
    async fn authenticate(
        &self,
        session_id: Option<&str>,
        jwt: Option<&str>,
    ) -> Result<(String, String), SubmitError> {
        let (Some(session_id), Some(jwt)) = (session_id, jwt) else {
            return Err(SubmitError::InvalidSession(
                "missing session headers".into(),
            ));
        };

        let session = self
            .sessions
            .get_session(session_id, jwt)
            .await
            .map_err(|e| SubmitError::InvalidSession(e.to_string()))?;

        let user = self
            .code_host
            .get_user(&session.provider_access_token)
            .await
            .map_err(|e| SubmitError::InvalidSession(e.to_string()))?;

        Ok((user.login, session.provider_access_token))
    }

    async fn load_app_totals(&self) -> Result<Document, SubmitError> {
        let page = self
            .store
            .list(Collection::AppTotals, &Query::new().limit(1))
            .await?;
        let document = page
            .documents
            .into_iter()
            .next()
            .ok_or(SubmitError::MissingAppTotals)?;

        let totals: AppTotals = document.parse()?;
        debug!(
            ratings = totals.ratings_count,
            repos = totals.repos_count,
            stars = totals.stars_sum,
            "Loaded app totals"
        );

        Ok(document)
    }

    async fn upsert_rating(
        &self,
        username: &str,
        url: &str,
        rating: i64,
    ) -> Result<RatingUpsert, SubmitError> {
        let existing = self
            .store
            .list(
                Collection::Ratings,
                &Query::new().equal("url", url).equal("username", username),
            )
            .await?;

        let record = RatingRecord {
            username: username.to_string(),
            url: url.to_string(),
            rating,
        };

        if let (1, Some(document)) = (existing.total, existing.documents.first()) {
            let previous = document.parse::<RatingRecord>()?.rating;
            info!(%username, %url, id = %document.id, previous, "User already rated repo, updating rating");
            self.store
                .update(Collection::Ratings, &document.id, to_fields(&record)?)
                .await?;
            counter!(RATING_UPDATED).increment(1);
            return Ok(RatingUpsert::Updated { previous });
        }

        if existing.total > 1 {
            warn!(%username, %url, count = existing.total, "Found duplicate ratings for user");
        }

        let created = self
            .store
            .create(Collection::Ratings, to_fields(&record)?)
            .await?;
        info!(%username, %url, id = %created.id, "User rating repo for the first time");
        counter!(RATING_CREATED).increment(1);

        Ok(RatingUpsert::Created)
    }

    async fn count_rating(
        &self,
        totals_id: &str,
        rating: i64,
        upsert: RatingUpsert,
    ) -> Result<(), SubmitError> {
        // Star deltas are f64 like the star sum itself.
        let (ratings_delta, stars_delta) = match (self.policy, upsert) {
            (CountingPolicy::EverySubmission, _) | (_, RatingUpsert::Created) => {
                (1, rating as f64)
            }
            (CountingPolicy::NewRatingsOnly, RatingUpsert::Updated { previous }) => {
                (0, rating as f64 - previous as f64)
            }
        };

        info!(%totals_id, ratings_delta, stars_delta, "Incrementing app total ratings");
        if ratings_delta != 0 {
            self.store
                .increment(
                    Collection::AppTotals,
                    totals_id,
                    AppTotals::RATINGS,
                    ratings_delta as f64,
                )
                .await?;
        }
        if stars_delta != 0.0 {
            self.store
                .increment(Collection::AppTotals, totals_id, AppTotals::STARS, stars_delta)
                .await?;
        }

        Ok(())
    }

    /// Returns true if the repository aggregate was created by this call.
    async fn upsert_repo(
        &self,
        url: &str,
        metadata: &RepoMetadata,
        rating: i64,
    ) -> Result<bool, SubmitError> {
        debug!(%url, "Checking if repo exists in database");
        let repos = self
            .store
            .list(Collection::Repos, &Query::new().equal("url", url))
            .await?;

        if let (1, Some(document)) = (repos.total, repos.documents.first()) {
            let ratings: Vec<RatingRecord> = list_all(
                self.store.as_ref(),
                Collection::Ratings,
                Query::new().equal("url", url),
            )
            .await?
            .iter()
            .map(Document::parse)
            .collect::<Result<_, _>>()?;

            let (mean, votes) = mean_rating(&ratings).unwrap_or((rating as f64, 1));
            let aggregate = RepoAggregate {
                url: url.to_string(),
                metadata: metadata.clone(),
                rating: mean,
                votes,
            };

            info!(%url, id = %document.id, rating = mean, votes, "Repo found in database, updating rating");
            self.store
                .update(Collection::Repos, &document.id, to_fields(&aggregate)?)
                .await?;
            return Ok(false);
        }

        let aggregate = RepoAggregate {
            url: url.to_string(),
            metadata: metadata.clone(),
            rating: rating as f64,
            votes: 1,
        };
        let created = self
            .store
            .create(Collection::Repos, to_fields(&aggregate)?)
            .await?;
        info!(%url, id = %created.id, "Repo not found in database, created repo");

        Ok(true)
    }
}

/// Arithmetic mean and count of the given ratings, or `None` if there are none.
fn mean_rating(ratings: &[RatingRecord]) -> Option<(f64, u64)> {
    if ratings.is_empty() {
        return None;
    }
    let sum: i128 = ratings.iter().map(|r| i128::from(r.rating)).sum();
    Some((sum as f64 / ratings.len() as f64, ratings.len() as u64))
}
