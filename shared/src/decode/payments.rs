use super::{missing, Decode, Fields, ResourceShape};
use crate::error::DecodeFailure;
use crate::model::{PaymentMethod, PaymentMethodId};

impl Decode for PaymentMethod {
    const SHAPE: ResourceShape = ResourceShape::PaymentMethod;

    fn decode_item(f: Fields<'_>) -> Result<Self, DecodeFailure> {
        let id = f
            .string(&["id", "_id", "paymentMethodId"])
            .ok_or_else(|| missing(Self::SHAPE, "id"))?;
        // Card details are sometimes nested the way the payment provider returns them.
        let card = f.object(&["card"]).unwrap_or(f);

        Ok(Self {
            id: PaymentMethodId(id),
            brand: card
                .string(&["brand", "type"])
                .or_else(|| f.string(&["brand", "type"]))
                .unwrap_or_else(|| "Card".into()),
            last4: card.string(&["last4", "last_4", "lastFour"]),
            exp_month: card.count(&["expMonth", "exp_month"]),
            exp_year: card.count(&["expYear", "exp_year"]),
            is_default: f.boolean(&["isDefault", "is_default", "default"]).unwrap_or(false),
        })
    }
}
