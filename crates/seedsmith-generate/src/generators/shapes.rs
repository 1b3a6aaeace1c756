use fake::Fake;
use fake::faker::address::en::{
    BuildingNumber, CityName, CountryCode, CountryName, StateName, StreetName, ZipCode,
};
use fake::faker::color::en::HexColor;
use fake::faker::company::en::CompanyName;
use fake::faker::currency::en::CurrencyCode;
use fake::faker::internet::en::{DomainSuffix, IPv4, Password, SafeEmail, Username};
use fake::faker::job::en::Title as JobTitle;
use fake::faker::lorem::en::{Sentence, Word, Words};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use rand::{Rng, RngCore};
use rand_chacha::ChaCha8Rng;
use seedsmith_plan::Shape;
use serde_json::Value;

/// Guess a shape from a field name or a free-text description.
pub fn infer_shape(text: &str) -> Option<Shape> {
    let name = text.to_lowercase();
    let tokens: Vec<&str> = name
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect();
    let has = |token: &str| tokens.contains(&token);

    let shape = if name.contains("email") {
        Shape::Email
    } else if name.contains("first_name") || name.contains("firstname") || has("forename") {
        Shape::FirstName
    } else if name.contains("last_name") || name.contains("lastname") || has("surname") {
        Shape::LastName
    } else if name.contains("full_name") || name.contains("fullname") || name == "name" {
        Shape::FullName
    } else if name.contains("username") || has("login") || has("handle") {
        Shape::Username
    } else if name.contains("password") {
        Shape::Password
    } else if name.contains("phone") || has("mobile") {
        Shape::Phone
    } else if has("city") {
        Shape::City
    } else if name.contains("country_code") {
        Shape::CountryCode
    } else if has("country") {
        Shape::Country
    } else if has("state") || has("province") {
        Shape::State
    } else if has("street") || has("address") {
        Shape::StreetAddress
    } else if has("zip") || has("zipcode") || has("postal") || has("postcode") {
        Shape::ZipCode
    } else if has("lat") || has("latitude") {
        Shape::Latitude
    } else if has("lng") || has("lon") || has("longitude") {
        Shape::Longitude
    } else if has("url") || has("website") || has("homepage") || has("link") {
        Shape::Url
    } else if has("domain") {
        Shape::DomainName
    } else if has("ip") {
        Shape::IpAddress
    } else if has("company") || has("organization") || has("employer") {
        Shape::Company
    } else if has("job") || has("occupation") || has("position") {
        Shape::JobTitle
    } else if has("title") || has("subject") || has("headline") {
        Shape::Title
    } else if has("description")
        || has("bio")
        || has("body")
        || has("content")
        || has("summary")
        || has("notes")
        || has("comment")
    {
        Shape::Description
    } else if has("color") || has("colour") {
        Shape::Color
    } else if has("currency") {
        Shape::Currency
    } else if has("price") || has("amount") || has("cost") || has("total") {
        Shape::Price
    } else if has("age") {
        Shape::Age
    } else if has("slug") {
        Shape::Slug
    } else {
        return None;
    };

    Some(shape)
}

/// Render a shape into a JSON value.
pub fn render(shape: Shape, rng: &mut ChaCha8Rng) -> Value {
    match shape {
        Shape::Email => text(SafeEmail().fake_with_rng(rng)),
        Shape::FirstName => text(FirstName().fake_with_rng(rng)),
        Shape::LastName => text(LastName().fake_with_rng(rng)),
        Shape::FullName => text(Name().fake_with_rng(rng)),
        Shape::Username => text(Username().fake_with_rng(rng)),
        Shape::Password => text(Password(10..20).fake_with_rng(rng)),
        Shape::Phone => text(PhoneNumber().fake_with_rng(rng)),
        Shape::City => text(CityName().fake_with_rng(rng)),
        Shape::Country => text(CountryName().fake_with_rng(rng)),
        Shape::CountryCode => text(CountryCode().fake_with_rng(rng)),
        Shape::State => text(StateName().fake_with_rng(rng)),
        Shape::StreetAddress => {
            let number: String = BuildingNumber().fake_with_rng(rng);
            let street: String = StreetName().fake_with_rng(rng);
            text(format!("{number} {street}"))
        }
        Shape::ZipCode => text(ZipCode().fake_with_rng(rng)),
        Shape::Latitude => Value::from(round(rng.random_range(-90.0..=90.0), 6)),
        Shape::Longitude => Value::from(round(rng.random_range(-180.0..=180.0), 6)),
        Shape::Url => {
            let domain = domain_name(rng);
            text(format!("https://{domain}"))
        }
        Shape::DomainName => text(domain_name(rng)),
        Shape::IpAddress => text(IPv4().fake_with_rng(rng)),
        Shape::Company => text(CompanyName().fake_with_rng(rng)),
        Shape::JobTitle => text(JobTitle().fake_with_rng(rng)),
        Shape::Title => {
            let sentence: String = Sentence(2..6).fake_with_rng(rng);
            text(sentence.trim_end_matches('.').to_string())
        }
        Shape::Description => text(Sentence(6..16).fake_with_rng(rng)),
        Shape::Word => text(Word().fake_with_rng(rng)),
        Shape::Color => text(HexColor().fake_with_rng(rng)),
        Shape::Currency => text(CurrencyCode().fake_with_rng(rng)),
        Shape::Price => Value::from(round(rng.random_range(1.0..=1000.0), 2)),
        Shape::Age => Value::from(rng.random_range(18..=90_i64)),
        Shape::Uuid => text(random_uuid(rng)),
        Shape::Slug => {
            let words: Vec<String> = Words(2..4).fake_with_rng(rng);
            text(words.join("-").to_lowercase())
        }
    }
}

pub(crate) fn random_uuid(rng: &mut ChaCha8Rng) -> String {
    let mut bytes = [0_u8; 16];
    rng.fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    uuid::Uuid::from_bytes(bytes).to_string()
}

fn domain_name(rng: &mut ChaCha8Rng) -> String {
    let word: String = Word().fake_with_rng(rng);
    let suffix: String = DomainSuffix().fake_with_rng(rng);
    format!("{}.{suffix}", word.to_lowercase())
}

fn round(value: f64, digits: i32) -> f64 {
    let factor = 10_f64.powi(digits);
    (value * factor).round() / factor
}

fn text(value: String) -> Value {
    Value::String(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn infers_common_shapes() {
        assert_eq!(infer_shape("email"), Some(Shape::Email));
        assert_eq!(infer_shape("contact_email"), Some(Shape::Email));
        assert_eq!(infer_shape("firstName"), Some(Shape::FirstName));
        assert_eq!(infer_shape("name"), Some(Shape::FullName));
        assert_eq!(infer_shape("shipping_city"), Some(Shape::City));
        assert_eq!(infer_shape("ip"), Some(Shape::IpAddress));
        assert_eq!(infer_shape("body"), Some(Shape::Description));
        assert_eq!(infer_shape("description"), Some(Shape::Description));
        assert_eq!(infer_shape("created_at"), None);
        assert_eq!(infer_shape("page"), None);
    }

    #[test]
    fn renders_well_formed_values() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let email = render(Shape::Email, &mut rng);
        assert!(email.as_str().is_some_and(|value| value.contains('@')));

        let url = render(Shape::Url, &mut rng);
        assert!(url.as_str().is_some_and(|value| value.starts_with("https://")));

        let id = render(Shape::Uuid, &mut rng);
        let parsed = id.as_str().and_then(|value| uuid::Uuid::parse_str(value).ok());
        assert!(parsed.is_some());

        let slug = render(Shape::Slug, &mut rng);
        assert!(slug.as_str().is_some_and(|value| !value.contains(' ')));
    }
}
