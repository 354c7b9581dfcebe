use super::{decode_page, missing, Decode, Fields, RawPayload, ResourceShape};
use crate::error::DecodeFailure;
use crate::model::{CategoryRatings, Page, Review, ReviewId, ReviewSummary, UserId};

impl Decode for Review {
    const SHAPE: ResourceShape = ResourceShape::Review;

    fn decode_item(f: Fields<'_>) -> Result<Self, DecodeFailure> {
        let id = f
            .string(&["id", "_id"])
            .ok_or_else(|| missing(Self::SHAPE, "id"))?;
        let author = f.object(&["user", "author", "reviewer", "guest"]);

        Ok(Self {
            id: ReviewId(id),
            author_id: author
                .and_then(|a| a.string(&["_id", "id"]))
                .or_else(|| f.string(&["userId", "authorId", "user_id"]))
                .map(UserId),
            author_name: author
                .and_then(|a| a.person_name())
                .or_else(|| f.string(&["userName", "authorName", "reviewerName"]))
                .unwrap_or_else(|| "Guest".into()),
            author_avatar: author
                .and_then(|a| a.string(&["avatar", "profileImage", "profile_image", "photo"])),
            rating: f
                .double(&["rating", "stars", "score"])
                .map_or(0.0, |r| r.clamp(0.0, 5.0)),
            comment: f.string_or(&["comment", "text", "review", "body"], ""),
            created_at: f.string(&["createdAt", "created_at", "date"]),
        })
    }
}

/// Reviews page together with the summary block the same response carries.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewsPayload {
    pub page: Page<Review>,
    pub summary: ReviewSummary,
}

impl ReviewsPayload {
    pub fn decode(raw: &RawPayload) -> Result<Self, DecodeFailure> {
        let page: Page<Review> = decode_page(raw)?;
        let summary = decode_review_summary(raw, &page.items);
        Ok(Self { page, summary })
    }
}

const STAR_KEYS: [(u8, &[&str]); 5] = [
    (1, &["1"]),
    (2, &["2"]),
    (3, &["3"]),
    (4, &["4"]),
    (5, &["5"]),
];

/// Each figure is resolved on its own: the `summary`/`stats` block first, then
/// top-level fields under `data` or the root, then the reviews at hand.
pub fn decode_review_summary(raw: &RawPayload, reviews: &[Review]) -> ReviewSummary {
    let root = raw.as_object().map(Fields::new);
    let data = root.and_then(|r| r.object(&["data"]));
    let levels: Vec<Fields<'_>> = [data, root].into_iter().flatten().collect();
    let block = levels.iter().find_map(|f| f.object(&["summary", "stats"]));
    let computed = ReviewSummary::from_reviews(reviews);

    let average_rating = block
        .and_then(|b| b.double(&["averageRating", "average_rating", "average", "avg", "rating"]))
        .or_else(|| {
            levels
                .iter()
                .find_map(|f| f.double(&["averageRating", "average_rating", "rating"]))
        })
        .unwrap_or(computed.average_rating);
    let total_count = block
        .and_then(|b| b.count(&["totalCount", "total_count", "total", "count"]))
        .or_else(|| {
            levels
                .iter()
                .find_map(|f| f.count(&["totalCount", "total_count", "count"]))
        })
        .unwrap_or(computed.total_count);

    let category_averages = block
        .and_then(|b| b.object(&["categoryAverages", "category_averages", "categories"]))
        .map(|c| CategoryRatings {
            cleanliness: c.double(&["cleanliness"]),
            accuracy: c.double(&["accuracy"]),
            communication: c.double(&["communication"]),
            location: c.double(&["location"]),
            check_in: c.double(&["checkIn", "check_in"]),
            value: c.double(&["value"]),
        });
    let distribution = block
        .and_then(|b| b.object(&["distribution", "ratingDistribution"]))
        .map(|d| {
            STAR_KEYS
                .iter()
                .filter_map(|(star, key)| d.count(key).map(|n| (*star, n)))
                .collect()
        })
        .unwrap_or_default();

    ReviewSummary {
        average_rating,
        total_count,
        category_averages,
        distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reviews_with_summary() {
        let raw = json!({
            "data": {
                "reviews": [
                    {"_id": "r1", "rating": 5, "comment": "Great", "user": {"firstName": "Ana"}},
                    {"rating": 1, "comment": "no id"},
                    {"id": "r2", "stars": "4", "text": "Good", "userName": "bo"}
                ],
                "summary": {"averageRating": 4.6, "totalCount": 40}
            }
        });
        let payload = ReviewsPayload::decode(&raw).expect("payload");
        assert_eq!(payload.page.items.len(), 2);
        assert_eq!(payload.page.items[0].author_name, "Ana");
        assert_eq!(payload.page.items[1].author_name, "bo");
        assert_eq!(payload.page.items[1].rating, 4.0);
        assert_eq!(payload.summary.total_count, 40);
    }

    #[test]
    fn test_summary_computed_when_absent() {
        let raw = json!({"results": [{"id": "r1", "rating": 3}, {"id": "r2", "rating": 5}]});
        let payload = ReviewsPayload::decode(&raw).expect("payload");
        assert_eq!(payload.summary.total_count, 2);
        assert!((payload.summary.average_rating - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_fields_resolve_independently() {
        let raw = json!({
            "reviews": [{"id": "r1", "rating": 4}, {"id": "r2", "rating": 2}],
            "summary": {"averageRating": 3.5}
        });
        let summary = ReviewsPayload::decode(&raw).expect("payload").summary;
        assert!((summary.average_rating - 3.5).abs() < f64::EPSILON);
        assert_eq!(summary.total_count, 2);

        let raw = json!({"data": {
            "reviews": [{"id": "r1", "rating": 4}],
            "averageRating": 4.2,
            "totalCount": 9
        }});
        let summary = ReviewsPayload::decode(&raw).expect("payload").summary;
        assert!((summary.average_rating - 4.2).abs() < f64::EPSILON);
        assert_eq!(summary.total_count, 9);
    }

    #[test]
    fn test_summary_categories_and_distribution() {
        let raw = json!({"data": {
            "reviews": [],
            "stats": {
                "average": 4.5,
                "total": 12,
                "categoryAverages": {"cleanliness": 4.8, "check_in": "4.1"},
                "distribution": {"5": 8, "4": 3, "1": 1, "7": 2}
            }
        }});
        let summary = ReviewsPayload::decode(&raw).expect("payload").summary;
        let categories = summary.category_averages.expect("categories");
        assert_eq!(categories.cleanliness, Some(4.8));
        assert_eq!(categories.check_in, Some(4.1));
        assert_eq!(categories.value, None);
        assert_eq!(
            summary.distribution.into_iter().collect::<Vec<_>>(),
            vec![(1, 1), (4, 3), (5, 8)]
        );
    }

    #[test]
    fn test_anonymous_review_uses_guest_placeholder() {
        let review = Review::decode_item(Fields::new(
            json!({"id": "r1", "rating": 9}).as_object().expect("object"),
        ))
        .expect("review");
        assert_eq!(review.author_name, "Guest");
        assert_eq!(review.rating, 5.0);
        assert_eq!(review.comment, "");
    }
}
