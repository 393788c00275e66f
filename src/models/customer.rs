use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    pub customer_number: String,
    pub company_name: String,
    pub org_nr: Option<String>,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub zip: Option<String>,
    pub city: Option<String>,
    pub country: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Customer fields as sent by clients, for create, update and import.
///
/// Every field is optional so the same shape serves partial updates. The
/// Swedish keys of older cached records and of the offer assistant's
/// `kund` object are accepted as aliases.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInput {
    #[serde(alias = "namn")]
    pub company_name: Option<String>,
    #[serde(alias = "orgnr")]
    pub org_nr: Option<String>,
    #[serde(alias = "kontaktperson")]
    pub contact_person: Option<String>,
    #[serde(alias = "epost")]
    pub email: Option<String>,
    #[serde(alias = "telefon")]
    pub phone: Option<String>,
    #[serde(alias = "adress")]
    pub address: Option<String>,
    #[serde(alias = "postnummer")]
    pub zip: Option<String>,
    #[serde(alias = "ort")]
    pub city: Option<String>,
    #[serde(alias = "land")]
    pub country: Option<String>,
    pub notes: Option<String>,
    #[serde(alias = "kundnummer")]
    pub customer_number: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl CustomerInput {
    pub fn company_name(&self) -> Option<String> {
        non_empty(&self.company_name)
    }

    /// Build a new customer record. The caller has already checked that a
    /// company name is present and picked a free customer number.
    pub fn into_customer(self, id: Uuid, customer_number: String, now: DateTime<Utc>) -> Customer {
        Customer {
            id,
            customer_number,
            company_name: self.company_name().unwrap_or_default(),
            org_nr: non_empty(&self.org_nr),
            contact_person: non_empty(&self.contact_person),
            email: non_empty(&self.email),
            phone: non_empty(&self.phone),
            address: non_empty(&self.address),
            zip: non_empty(&self.zip),
            city: non_empty(&self.city),
            country: non_empty(&self.country).unwrap_or_else(|| "Sverige".to_string()),
            notes: non_empty(&self.notes),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the customer's fields with every non-empty field of the
    /// input. Returns whether anything changed.
    pub fn apply_to(&self, customer: &mut Customer) -> bool {
        let mut changed = false;

        if let Some(name) = self.company_name() {
            if customer.company_name != name {
                customer.company_name = name;
                changed = true;
            }
        }
        if let Some(country) = non_empty(&self.country) {
            if customer.country != country {
                customer.country = country;
                changed = true;
            }
        }

        let optional = [
            (&self.org_nr, &mut customer.org_nr),
            (&self.contact_person, &mut customer.contact_person),
            (&self.email, &mut customer.email),
            (&self.phone, &mut customer.phone),
            (&self.address, &mut customer.address),
            (&self.zip, &mut customer.zip),
            (&self.city, &mut customer.city),
            (&self.notes, &mut customer.notes),
        ];
        for (incoming, current) in optional {
            if let Some(value) = non_empty(incoming) {
                if current.as_deref() != Some(value.as_str()) {
                    *current = Some(value);
                    changed = true;
                }
            }
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str) -> CustomerInput {
        CustomerInput {
            company_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn blank_fields_become_none_and_country_defaults() {
        let mut raw = input("  Kalles Bygg AB ");
        raw.email = Some("   ".into());
        let customer = raw.into_customer(Uuid::new_v4(), "K-123456".into(), Utc::now());

        assert_eq!(customer.company_name, "Kalles Bygg AB");
        assert_eq!(customer.email, None);
        assert_eq!(customer.country, "Sverige");
    }

    #[test]
    fn apply_only_overwrites_non_empty_fields() {
        let mut customer = input("Kalles Bygg AB").into_customer(Uuid::new_v4(), "K-1".into(), Utc::now());
        customer.phone = Some("08-123".into());

        let patch = CustomerInput {
            email: Some("info@kalle.se".into()),
            phone: Some("".into()),
            ..Default::default()
        };

        assert!(patch.apply_to(&mut customer));
        assert_eq!(customer.email.as_deref(), Some("info@kalle.se"));
        assert_eq!(customer.phone.as_deref(), Some("08-123"));
        assert!(!patch.apply_to(&mut customer));
    }

    #[test]
    fn accepts_swedish_keys() {
        let raw: CustomerInput = serde_json::from_value(serde_json::json!({
            "namn": "Byggare Bob AB",
            "orgnr": "556677-8899",
            "epost": "bob@bygg.se",
            "postnummer": "123 45"
        }))
        .unwrap();
        assert_eq!(raw.company_name().as_deref(), Some("Byggare Bob AB"));
        assert_eq!(raw.org_nr.as_deref(), Some("556677-8899"));
        assert_eq!(raw.zip.as_deref(), Some("123 45"));
    }
}
