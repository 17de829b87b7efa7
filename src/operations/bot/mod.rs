//! Recommendation bot
//!
//! Orchestrates one conversational turn: rewrite the free-text request into
//! a search keyword, run a nearby search around the user, upsert the
//! candidates so they are ready to display, then ask the completion model to
//! pick one. The model answers in prose, so the pick is recovered by
//! substring-matching candidate names against the answer; a reply that
//! names no known candidate is retried up to the attempt budget.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::infrastructure::completion::TextCompletion;
use crate::infrastructure::places::{PlaceCandidate, PlacesService};
use crate::operations::query::GeoPoint;
use crate::operations::restaurants::RestaurantService;
use crate::shared::{CoreError, Result, Viewer};

/// Reply when the nearby search comes back empty
const NO_CANDIDATES_REPLY: &str = "對不起，附近沒有符合條件的餐廳，試試看其他關鍵字吧！";

const REWRITE_SYSTEM_PROMPT: &str = "You turn a dining request into up to three short food \
or category keywords for a places search. Answer with the keywords only, separated by \
spaces, no punctuation and no explanation.";

const RECOMMEND_SYSTEM_PROMPT: &str = "You are a friendly restaurant guide. Pick exactly one \
restaurant from the candidate list, considering its rating, categories and price level, and \
recommend it in two or three sentences, mentioning its name verbatim as it appears in the \
list.";

/// Tunables for one bot turn
#[derive(Clone, Debug)]
pub struct BotPolicy {
    /// Recommendation attempts before giving up on name matching
    pub max_attempts: u32,
    /// Nearby-search radius in meters
    pub search_radius_m: u32,
}

impl Default for BotPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            search_radius_m: 1000,
        }
    }
}

/// One bot answer. `place_id` is present only when the answer names a
/// candidate from this turn's search.
#[derive(Clone, Debug, PartialEq)]
pub struct BotReply {
    pub message: String,
    pub place_id: Option<String>,
}

pub struct RecommendationBot {
    completion: Arc<dyn TextCompletion>,
    places: Arc<PlacesService>,
    restaurants: Arc<RestaurantService>,
    policy: BotPolicy,
}

impl RecommendationBot {
    pub fn new(
        completion: Arc<dyn TextCompletion>,
        places: Arc<PlacesService>,
        restaurants: Arc<RestaurantService>,
        policy: BotPolicy,
    ) -> Self {
        Self {
            completion,
            places,
            restaurants,
            policy,
        }
    }

    /// One conversational turn
    pub async fn recommend(
        &self,
        viewer: Viewer,
        request: &str,
        position: GeoPoint,
    ) -> Result<BotReply> {
        viewer.require()?;

        let keyword = self.rewrite_keyword(request).await?;
        debug!(%keyword, "bot search keyword");

        let candidates = self
            .places
            .nearby(&keyword, position.lat, position.lng, self.policy.search_radius_m)
            .await?;
        if candidates.is_empty() {
            info!(%keyword, "no candidates near the user");
            return Ok(BotReply {
                message: NO_CANDIDATES_REPLY.to_string(),
                place_id: None,
            });
        }
        self.restaurants.upsert_candidates(&candidates).await?;

        let menu = candidate_menu(&candidates);
        let prompt = format!("Request: {request}\n\nCandidates:\n{menu}");

        let mut last_answer = None;
        for attempt in 1..=self.policy.max_attempts {
            let answer = self.completion.complete(RECOMMEND_SYSTEM_PROMPT, &prompt).await?;
            if let Some(hit) = match_candidate(&answer, &candidates) {
                info!(place_id = %hit.place_id, attempt, "bot matched a candidate");
                return Ok(BotReply {
                    message: answer,
                    place_id: Some(hit.place_id.clone()),
                });
            }
            debug!(attempt, "bot answer named no candidate");
            last_answer = Some(answer);
        }

        // Budget exhausted: ship the prose anyway, just without a pick
        warn!(
            attempts = self.policy.max_attempts,
            "bot never named a candidate"
        );
        Ok(BotReply {
            message: last_answer.unwrap_or_else(|| NO_CANDIDATES_REPLY.to_string()),
            place_id: None,
        })
    }

    /// Rewrite the request into search keywords. A model failure fails the
    /// whole turn; the search never runs on an unrewritten request.
    async fn rewrite_keyword(&self, request: &str) -> Result<String> {
        let keyword = self
            .completion
            .complete(REWRITE_SYSTEM_PROMPT, request)
            .await?;
        let keyword = keyword.trim();
        if keyword.is_empty() {
            // Treated the same as an upstream failure: nothing to search for
            warn!("keyword rewrite came back empty");
            return Err(CoreError::UpstreamUnavailable("keyword rewrite failed"));
        }
        Ok(keyword.to_string())
    }
}

fn candidate_menu(candidates: &[PlaceCandidate]) -> String {
    candidates
        .iter()
        .map(|c| {
            let price = c
                .price_level
                .map(|level| format!(", price level {level}"))
                .unwrap_or_default();
            format!(
                "- {} (rating {:.1}, categories: {}{price})",
                c.name,
                c.rating,
                c.types.join(", "),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Find the candidate whose name appears verbatim in the answer. Longer
/// names win so "JJ Poke Taipei" beats "JJ Poke" when both are present.
fn match_candidate<'a>(answer: &str, candidates: &'a [PlaceCandidate]) -> Option<&'a PlaceCandidate> {
    candidates
        .iter()
        .filter(|c| !c.name.is_empty() && answer.contains(&c.name))
        .max_by_key(|c| c.name.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::Database;
    use crate::infrastructure::places::{GeoSearch, PlaceDetails};
    use async_trait::async_trait;
    use sea_orm::{EntityTrait, PaginatorTrait};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedModel {
        calls: AtomicUsize,
        replies: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<&str>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                replies: Mutex::new(replies.into_iter().map(str::to_owned).collect()),
            }
        }
    }

    #[async_trait]
    impl TextCompletion for ScriptedModel {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Err(CoreError::UpstreamUnavailable("text completion failed"))
            } else {
                Ok(replies.remove(0))
            }
        }
    }

    struct FixedSearch {
        candidates: Vec<PlaceCandidate>,
    }

    #[async_trait]
    impl GeoSearch for FixedSearch {
        async fn nearby(
            &self,
            _keyword: &str,
            _lat: f64,
            _lng: f64,
            _radius_m: u32,
        ) -> Result<Vec<PlaceCandidate>> {
            Ok(self.candidates.clone())
        }

        async fn details(&self, _place_id: &str) -> Result<Option<PlaceDetails>> {
            Ok(None)
        }
    }

    fn candidate(place_id: &str, name: &str) -> PlaceCandidate {
        PlaceCandidate {
            place_id: place_id.into(),
            name: name.into(),
            rating: 4.2,
            user_ratings_total: Some(10),
            types: vec!["restaurant".into()],
            price_level: Some(2),
            lat: 25.0,
            lng: 121.5,
            photo_url: None,
        }
    }

    async fn bot_with(
        candidates: Vec<PlaceCandidate>,
        model: Arc<ScriptedModel>,
        policy: BotPolicy,
    ) -> (Arc<sea_orm::DatabaseConnection>, RecommendationBot) {
        let db = Database::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let db = Arc::new(db.conn().clone());
        let places = Arc::new(PlacesService::new(
            Arc::new(FixedSearch { candidates }),
            Duration::from_secs(3600),
        ));
        let restaurants = Arc::new(RestaurantService::new(db.clone(), places.clone()));
        let bot = RecommendationBot::new(model, places, restaurants, policy);
        (db, bot)
    }

    fn here() -> GeoPoint {
        GeoPoint {
            lat: 25.03,
            lng: 121.56,
        }
    }

    #[tokio::test]
    async fn verbatim_name_in_the_answer_is_matched() {
        let model = Arc::new(ScriptedModel::new(vec![
            "poke",
            "You should try JJ Poke, their salmon bowl is fantastic.",
        ]));
        let (db, bot) = bot_with(
            vec![candidate("p1", "JJ Poke"), candidate("p2", "Ramen Bar")],
            model.clone(),
            BotPolicy::default(),
        )
        .await;

        let reply = bot
            .recommend(Viewer::user(1), "something hawaiian", here())
            .await
            .unwrap();
        assert_eq!(reply.place_id.as_deref(), Some("p1"));
        assert!(reply.message.contains("JJ Poke"));
        // one rewrite call plus one recommendation call
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);

        // candidates were upserted before the recommendation
        use crate::infrastructure::database::entities::Restaurant;
        assert_eq!(Restaurant::find().count(&*db).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_search_short_circuits_without_model_calls() {
        let model = Arc::new(ScriptedModel::new(vec!["poke"]));
        let (_db, bot) = bot_with(vec![], model.clone(), BotPolicy::default()).await;

        let reply = bot
            .recommend(Viewer::user(1), "something hawaiian", here())
            .await
            .unwrap();
        assert_eq!(reply.message, NO_CANDIDATES_REPLY);
        assert_eq!(reply.place_id, None);
        // only the rewrite ran
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unmatched_answers_are_retried_up_to_the_budget() {
        let model = Arc::new(ScriptedModel::new(vec![
            "poke",
            "Try the sushi place around the corner.",
            "How about a nice bowl of noodles?",
            "You should try JJ Poke today.",
        ]));
        let (_db, bot) = bot_with(
            vec![candidate("p1", "JJ Poke")],
            model.clone(),
            BotPolicy::default(),
        )
        .await;

        let reply = bot
            .recommend(Viewer::user(1), "something hawaiian", here())
            .await
            .unwrap();
        assert_eq!(reply.place_id.as_deref(), Some("p1"));
        // rewrite + two misses + one hit
        assert_eq!(model.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exhausted_budget_returns_the_last_answer_without_a_pick() {
        let model = Arc::new(ScriptedModel::new(vec![
            "poke",
            "miss one",
            "miss two",
            "miss three, but good luck out there!",
        ]));
        let policy = BotPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        let (_db, bot) = bot_with(vec![candidate("p1", "JJ Poke")], model.clone(), policy).await;

        let reply = bot
            .recommend(Viewer::user(1), "something hawaiian", here())
            .await
            .unwrap();
        assert_eq!(reply.place_id, None);
        assert_eq!(reply.message, "miss three, but good luck out there!");
        assert_eq!(model.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn failed_rewrite_fails_the_whole_turn() {
        // First call (the rewrite) errors; the turn must fail right there,
        // even though a later recommendation call would have succeeded
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (db, bot) = bot_with(
            vec![candidate("p1", "JJ Poke")],
            model.clone(),
            BotPolicy::default(),
        )
        .await;

        let err = bot
            .recommend(Viewer::user(1), "poke bowls", here())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UpstreamUnavailable(_)));
        // no retry of the rewrite and no recommendation call
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);

        // nothing was searched or upserted
        use crate::infrastructure::database::entities::Restaurant;
        assert_eq!(Restaurant::find().count(&*db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_rewrite_counts_as_an_upstream_failure() {
        let model = Arc::new(ScriptedModel::new(vec!["   "]));
        let (_db, bot) = bot_with(
            vec![candidate("p1", "JJ Poke")],
            model.clone(),
            BotPolicy::default(),
        )
        .await;

        let err = bot
            .recommend(Viewer::user(1), "poke bowls", here())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UpstreamUnavailable(_)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn menu_lines_carry_rating_categories_and_price() {
        let mut c = candidate("p1", "JJ Poke");
        c.types = vec!["restaurant".into(), "food".into()];
        c.price_level = Some(2);
        let menu = candidate_menu(&[c]);
        assert_eq!(
            menu,
            "- JJ Poke (rating 4.2, categories: restaurant, food, price level 2)"
        );

        let mut unpriced = candidate("p2", "Ramen Bar");
        unpriced.price_level = None;
        let menu = candidate_menu(&[unpriced]);
        assert_eq!(menu, "- Ramen Bar (rating 4.2, categories: restaurant)");
    }

    #[tokio::test]
    async fn longest_matching_name_wins() {
        let answer = "Go to JJ Poke Taipei, it is the better branch.";
        let candidates = vec![candidate("p1", "JJ Poke"), candidate("p2", "JJ Poke Taipei")];
        let hit = match_candidate(answer, &candidates).unwrap();
        assert_eq!(hit.place_id, "p2");
    }

    #[tokio::test]
    async fn anonymous_caller_is_rejected() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (_db, bot) = bot_with(vec![], model, BotPolicy::default()).await;

        let err = bot
            .recommend(Viewer::ANONYMOUS, "poke", here())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unauthenticated));
    }
}
