use super::{missing, Decode, Fields, ResourceShape};
use crate::error::DecodeFailure;
use crate::model::{
    ListingDetail, ListingHost, ListingId, ListingLocation, ListingPricing, UserId,
    WishlistItemId,
};

impl Decode for ListingDetail {
    const SHAPE: ResourceShape = ResourceShape::ListingDetail;

    fn decode_item(f: Fields<'_>) -> Result<Self, DecodeFailure> {
        let id = f
            .string(&["id", "_id", "listingId"])
            .ok_or_else(|| missing(Self::SHAPE, "id"))?;

        let mut image_urls = f.strings(&["images", "gallery", "photos", "imageUrls"]);
        if image_urls.is_empty() {
            image_urls.extend(f.string(&["image", "imageUrl", "thumbnail", "coverImage"]));
        }

        Ok(Self {
            id: ListingId(id),
            title: f.string_or(&["title", "name"], "Listing"),
            description: f.string(&["description", "summary", "about"]),
            image_urls,
            location: decode_location(f),
            pricing: decode_pricing(f),
            host: f.object(&["host", "user", "owner"]).map(decode_host),
            amenities: f.strings(&["amenities", "features"]),
            rating: f.double(&["rating", "averageRating", "avgRating"]),
            review_count: f.count(&["reviewCount", "reviewsCount", "review_count", "totalReviews"]),
            max_guests: f.count(&["maxGuests", "max_guests", "guests", "capacity"]),
            bedrooms: f.count(&["bedrooms"]),
            bathrooms: f.double(&["bathrooms"]),
            is_favorite: f
                .boolean(&["liked", "isLiked", "isFavorited", "isFavorite", "is_wishlisted"])
                .unwrap_or(false),
            wishlist_item_id: f
                .string(&["wishlistItemId", "wishlistId", "wishlist_id"])
                .map(WishlistItemId),
        })
    }
}

/// Location may be a nested object or flat fields on the listing itself.
fn decode_location(f: Fields<'_>) -> Option<ListingLocation> {
    let loc = f.object(&["location", "address"]).unwrap_or(f);
    let location = ListingLocation {
        address: loc.string(&["address", "street", "formattedAddress", "fullAddress"]),
        city: loc.string(&["city"]),
        state: loc.string(&["state", "region"]),
        country: loc.string(&["country"]),
        latitude: loc.double(&["latitude", "lat"]),
        longitude: loc.double(&["longitude", "lng", "lon"]),
    };
    let empty = location.address.is_none()
        && location.city.is_none()
        && location.state.is_none()
        && location.country.is_none()
        && location.latitude.is_none()
        && location.longitude.is_none();
    (!empty).then_some(location)
}

fn decode_pricing(f: Fields<'_>) -> Option<ListingPricing> {
    let p = f.object(&["pricing", "price"]).unwrap_or(f);
    let pricing = ListingPricing {
        base_price: p.double(&["base_price", "basePrice", "amount", "price"]),
        hourly_from: p.double(&["hourlyFrom", "hourly_from", "hourlyRate"]),
        currency: p.string(&["currency"]),
        frequency: p.string(&["frequency", "unit", "per"]),
    };
    (pricing.base_price.is_some() || pricing.hourly_from.is_some()).then_some(pricing)
}

fn decode_host(f: Fields<'_>) -> ListingHost {
    ListingHost {
        id: f.string(&["_id", "id"]).map(UserId),
        name: f.person_name(),
        avatar_url: f.string(&["avatar", "profileImage", "profile_image", "photo"]),
        is_superhost: f
            .boolean(&["isSuperhost", "superhost", "is_superhost"])
            .unwrap_or(false),
        is_verified: f
            .boolean(&["isVerified", "verified", "is_verified"])
            .unwrap_or(false),
    }
}
