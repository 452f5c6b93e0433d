//! Contact and delivery details recovered from Stripe objects.

use crate::models::DeliveryDetails;
use crate::stripe::PaymentIntent;
use crate::stripe::types::Address;

/// One place Stripe may hold a shopper's details.
#[derive(Default)]
struct Source<'a> {
    name: Option<&'a str>,
    email: Option<&'a str>,
    phone: Option<&'a str>,
    address: Option<&'a Address>,
}

/// Build delivery details for an order from an expanded payment intent.
///
/// Sources are searched in order: the intent's shipping details, the latest
/// charge's billing details and shipping, then the customer record and its
/// shipping. Name, email and phone each take the first non-empty value. The
/// address is taken whole from the first source whose address has a street
/// line or a country, so its parts never come from different places. The
/// receipt email is used when no source has an email.
#[must_use]
pub fn recover_details(intent: &PaymentIntent) -> DeliveryDetails {
    let mut sources = Vec::new();

    if let Some(shipping) = &intent.shipping {
        sources.push(Source {
            name: shipping.name.as_deref(),
            phone: shipping.phone.as_deref(),
            address: shipping.address.as_ref(),
            ..Source::default()
        });
    }
    if let Some(charge) = intent.charge() {
        if let Some(billing) = &charge.billing_details {
            sources.push(Source {
                name: billing.name.as_deref(),
                email: billing.email.as_deref(),
                phone: billing.phone.as_deref(),
                address: billing.address.as_ref(),
            });
        }
        if let Some(shipping) = &charge.shipping {
            sources.push(Source {
                name: shipping.name.as_deref(),
                phone: shipping.phone.as_deref(),
                address: shipping.address.as_ref(),
                ..Source::default()
            });
        }
    }
    if let Some(customer) = intent.customer() {
        sources.push(Source {
            name: customer.name.as_deref(),
            email: customer.email.as_deref(),
            phone: customer.phone.as_deref(),
            address: customer.address.as_ref(),
        });
        if let Some(shipping) = &customer.shipping {
            sources.push(Source {
                name: shipping.name.as_deref(),
                phone: shipping.phone.as_deref(),
                address: shipping.address.as_ref(),
                ..Source::default()
            });
        }
    }

    let address = sources.iter().filter_map(|s| s.address).find(|a| {
        non_empty(a.line1.as_deref()).is_some() || non_empty(a.country.as_deref()).is_some()
    });
    let part = |get: fn(&Address) -> Option<&str>| address.and_then(|a| non_empty(get(a)));

    let email = first(sources.iter().map(|s| s.email)).or_else(|| {
        non_empty(
            intent
                .receipt_email
                .as_deref()
                .or_else(|| intent.charge().and_then(|c| c.receipt_email.as_deref())),
        )
    });

    DeliveryDetails {
        full_name: first(sources.iter().map(|s| s.name)).unwrap_or_default(),
        email: email.unwrap_or_default(),
        phone_number: first(sources.iter().map(|s| s.phone)).unwrap_or_default(),
        country: part(|a| a.country.as_deref()).unwrap_or_default(),
        postcode: part(|a| a.postal_code.as_deref()),
        town_or_city: part(|a| a.city.as_deref()).unwrap_or_default(),
        street_address1: part(|a| a.line1.as_deref()).unwrap_or_default(),
        street_address2: part(|a| a.line2.as_deref()),
        county: part(|a| a.state.as_deref()),
    }
}

fn first<'a>(mut values: impl Iterator<Item = Option<&'a str>>) -> Option<String> {
    values.find_map(non_empty)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn intent(value: serde_json::Value) -> PaymentIntent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_shipping_then_billing() {
        let details = recover_details(&intent(serde_json::json!({
            "id": "pi_1",
            "shipping": {
                "name": "Ada Lovelace",
                "phone": "",
                "address": { "line1": "12 St James's Square", "city": "London", "country": "GB" }
            },
            "latest_charge": {
                "id": "ch_1",
                "billing_details": {
                    "name": "A. Lovelace",
                    "email": "ada@example.com",
                    "phone": "+44 20 7946 0000",
                    "address": { "line1": "Billing Street 1", "postal_code": "SW1Y 4LE" }
                }
            }
        })));

        assert_eq!(details.full_name, "Ada Lovelace");
        assert_eq!(details.email, "ada@example.com");
        assert_eq!(details.phone_number, "+44 20 7946 0000");
        assert_eq!(details.street_address1, "12 St James's Square");
        assert_eq!(details.town_or_city, "London");
        assert_eq!(details.postcode, None);
        assert_eq!(details.county, None);
    }

    #[test]
    fn test_address_never_mixes_sources() {
        let details = recover_details(&intent(serde_json::json!({
            "id": "pi_4",
            "shipping": {
                "name": "Ada Lovelace",
                "address": { "line1": "  ", "postal_code": "W1A 1AA" }
            },
            "latest_charge": {
                "id": "ch_4",
                "billing_details": {
                    "address": {
                        "line1": "1 Infinite Loop",
                        "city": "Cupertino",
                        "state": "CA",
                        "country": "US"
                    }
                }
            },
            "customer": {
                "id": "cus_4",
                "address": { "line1": "Elsewhere 9", "postal_code": "12345", "line2": "Flat 2" }
            }
        })));

        assert_eq!(details.full_name, "Ada Lovelace");
        assert_eq!(details.street_address1, "1 Infinite Loop");
        assert_eq!(details.town_or_city, "Cupertino");
        assert_eq!(details.county.as_deref(), Some("CA"));
        assert_eq!(details.country, "US");
        assert_eq!(details.postcode, None);
        assert_eq!(details.street_address2, None);
    }

    #[test]
    fn test_customer_and_receipt_email_fallbacks() {
        let details = recover_details(&intent(serde_json::json!({
            "id": "pi_2",
            "receipt_email": "receipt@example.com",
            "customer": {
                "id": "cus_1",
                "name": "Grace Hopper",
                "address": { "city": "Arlington", "state": "VA", "country": "US" }
            }
        })));

        assert_eq!(details.full_name, "Grace Hopper");
        assert_eq!(details.email, "receipt@example.com");
        assert_eq!(details.county.as_deref(), Some("VA"));
        assert_eq!(details.town_or_city, "Arlington");
    }

    #[test]
    fn test_nothing_known() {
        let details = recover_details(&intent(serde_json::json!({ "id": "pi_3" })));
        assert_eq!(details, DeliveryDetails::default());
    }
}
