//! Raw signal tables: inserts for loaders and tests, and the snapshot read.
//!
//! RULE: A malformed record never aborts a load. It is skipped (or its bad
//! field treated as missing) with a warning, and the rest of the snapshot
//! is returned.

use super::{HealthStore, DATETIME_FORMAT, DATE_FORMAT};
use crate::{
    error::{HealthError, HealthResult},
    snapshot::{
        canonical_fraction, canonical_nps, canonical_ticket_satisfaction, Customer,
        FeedbackRecord, ProductUsage, RenewalLikelihood, SecurityIncident, Severity,
        SignalSnapshot, SupportTicket,
    },
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, types::ValueRef, Row};

/// Numeric cell as f64. Text is parsed; anything unreadable is None.
fn read_f64(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<f64>> {
    let v = match row.get_ref(idx)? {
        ValueRef::Real(f)    => Some(f),
        ValueRef::Integer(i) => Some(i as f64),
        ValueRef::Text(t)    => std::str::from_utf8(t)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    };
    Ok(v.filter(|f| f.is_finite()))
}

fn read_bool(row: &Row<'_>, idx: usize) -> rusqlite::Result<bool> {
    Ok(read_f64(row, idx)?.map(|v| v != 0.0).unwrap_or(false))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .or_else(|| parse_datetime(raw).map(|dt| dt.date()))
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn required_date(entity: &'static str, id: &str, field: &str, raw: &str) -> HealthResult<NaiveDate> {
    parse_date(raw).ok_or_else(|| HealthError::data(entity, id, format!("unparseable {field} '{raw}'")))
}

/// Log and drop a malformed record.
fn skip_malformed<T>(result: HealthResult<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("Skipping record: {e}");
            None
        }
    }
}

impl HealthStore {
    // ── Inserts ────────────────────────────────────────────────

    pub fn insert_customer(&self, c: &Customer) -> HealthResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO customer
             (customer_id, company_name, industry, monthly_recurring_revenue,
              contract_start_date, contract_end_date, risk_score, contract_value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                c.customer_id,
                c.company_name,
                c.industry,
                c.monthly_recurring_revenue,
                c.contract_start_date.format(DATE_FORMAT).to_string(),
                c.contract_end_date.format(DATE_FORMAT).to_string(),
                c.risk_score,
                c.contract_value,
            ],
        )?;
        Ok(())
    }

    pub fn insert_ticket(&self, t: &SupportTicket) -> HealthResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO support_ticket
             (ticket_id, customer_id, status, resolution_time_hours,
              satisfaction_score, escalated, created_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                t.ticket_id,
                t.customer_id,
                t.status,
                t.resolution_time_hours,
                t.satisfaction_score,
                t.escalated as i32,
                t.created_date.format(DATE_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_incident(&self, i: &SecurityIncident) -> HealthResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO security_incident
             (incident_id, customer_id, severity, detection_time, resolution_time,
              false_positive, mean_time_to_detect_minutes, mean_time_to_respond_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                i.incident_id,
                i.customer_id,
                i.severity.as_str(),
                i.detection_time.format(DATETIME_FORMAT).to_string(),
                i.resolution_time.map(|t| t.format(DATETIME_FORMAT).to_string()),
                i.false_positive as i32,
                i.mean_time_to_detect_minutes,
                i.mean_time_to_respond_minutes,
            ],
        )?;
        Ok(())
    }

    pub fn insert_usage(&self, u: &ProductUsage) -> HealthResult<()> {
        self.conn.execute(
            "INSERT INTO product_usage
             (customer_id, date, daily_active_users, login_frequency,
              feature_adoption_score, license_utilization)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                u.customer_id,
                u.date.format(DATE_FORMAT).to_string(),
                u.daily_active_users,
                u.login_frequency,
                u.feature_adoption_score,
                u.license_utilization,
            ],
        )?;
        Ok(())
    }

    pub fn insert_feedback(&self, f: &FeedbackRecord) -> HealthResult<()> {
        let renew = f.likelihood_to_renew.map(|l| match l {
            RenewalLikelihood::Low    => "Low",
            RenewalLikelihood::Medium => "Medium",
            RenewalLikelihood::High   => "High",
        });
        self.conn.execute(
            "INSERT INTO customer_feedback
             (customer_id, nps_score, satisfaction_rating, likelihood_to_renew, feedback_date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                f.customer_id,
                f.nps_score,
                f.satisfaction_rating,
                renew,
                f.feedback_date.format(DATE_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    /// Insert a whole snapshot in one transaction.
    pub fn insert_snapshot(&self, snapshot: &SignalSnapshot) -> HealthResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for c in &snapshot.customers {
            self.insert_customer(c)?;
        }
        for t in &snapshot.tickets {
            self.insert_ticket(t)?;
        }
        for i in &snapshot.incidents {
            self.insert_incident(i)?;
        }
        for u in &snapshot.usage {
            self.insert_usage(u)?;
        }
        for f in &snapshot.feedback {
            self.insert_feedback(f)?;
        }
        tx.commit()?;
        Ok(())
    }

    // ── Snapshot load ──────────────────────────────────────────

    /// Read every raw signal table into an immutable snapshot, with field
    /// scales canonicalized. Customers come back ordered by id.
    pub fn load_snapshot(&self) -> HealthResult<SignalSnapshot> {
        let snapshot = SignalSnapshot {
            customers: self.load_customers()?,
            tickets:   self.load_tickets()?,
            incidents: self.load_incidents()?,
            usage:     self.load_usage()?,
            feedback:  self.load_feedback()?,
        };
        log::debug!(
            "Loaded snapshot: {} customers, {} tickets, {} incidents, {} usage rows, {} feedback",
            snapshot.customers.len(),
            snapshot.tickets.len(),
            snapshot.incidents.len(),
            snapshot.usage.len(),
            snapshot.feedback.len()
        );
        Ok(snapshot)
    }

    fn load_customers(&self) -> HealthResult<Vec<Customer>> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, company_name, industry, monthly_recurring_revenue,
                    contract_start_date, contract_end_date, risk_score, contract_value
             FROM customer ORDER BY customer_id ASC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    read_f64(row, 3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    read_f64(row, 7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(raw
            .into_iter()
            .filter_map(|(id, name, industry, mrr, start, end, risk, value)| {
                skip_malformed((|| -> HealthResult<Customer> {
                    let start = required_date("customer", &id, "contract_start_date", &start)?;
                    let end = required_date("customer", &id, "contract_end_date", &end)?;
                    Ok(Customer {
                        customer_id:               id,
                        company_name:              name,
                        industry,
                        monthly_recurring_revenue: mrr.unwrap_or(0.0).max(0.0),
                        contract_start_date:       start,
                        contract_end_date:         end,
                        risk_score:                risk,
                        contract_value:            value,
                    })
                })())
            })
            .collect())
    }

    fn load_tickets(&self) -> HealthResult<Vec<SupportTicket>> {
        let mut stmt = self.conn.prepare(
            "SELECT ticket_id, customer_id, status, resolution_time_hours,
                    satisfaction_score, escalated, created_date
             FROM support_ticket ORDER BY ticket_id ASC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    read_f64(row, 3)?,
                    read_f64(row, 4)?,
                    read_bool(row, 5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(raw
            .into_iter()
            .filter_map(|(id, customer_id, status, hours, sat, escalated, created)| {
                skip_malformed(required_date("support_ticket", &id, "created_date", &created).map(
                    |created_date| SupportTicket {
                        ticket_id: id,
                        customer_id,
                        status,
                        resolution_time_hours: hours.map(|h| h.max(0.0)),
                        satisfaction_score: sat.map(canonical_ticket_satisfaction),
                        escalated,
                        created_date,
                    },
                ))
            })
            .collect())
    }

    fn load_incidents(&self) -> HealthResult<Vec<SecurityIncident>> {
        let mut stmt = self.conn.prepare(
            "SELECT incident_id, customer_id, severity, detection_time, resolution_time,
                    false_positive, mean_time_to_detect_minutes, mean_time_to_respond_minutes
             FROM security_incident ORDER BY incident_id ASC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    read_bool(row, 5)?,
                    read_f64(row, 6)?,
                    read_f64(row, 7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(raw
            .into_iter()
            .filter_map(|(id, customer_id, severity, detected, resolved, fp, mttd, mttr)| {
                let Some(detection_time) = parse_datetime(&detected) else {
                    log::warn!("Skipping record: {}", HealthError::data(
                        "security_incident", &id, format!("unparseable detection_time '{detected}'"),
                    ));
                    return None;
                };
                let severity = Severity::parse(&severity).unwrap_or_else(|| {
                    log::warn!("Incident {id}: unknown severity '{severity}', treating as Low");
                    Severity::Low
                });
                Some(SecurityIncident {
                    incident_id: id,
                    customer_id,
                    severity,
                    detection_time,
                    resolution_time: resolved.as_deref().and_then(parse_datetime),
                    false_positive: fp,
                    mean_time_to_detect_minutes: mttd.unwrap_or(0.0).max(0.0),
                    mean_time_to_respond_minutes: mttr.unwrap_or(0.0).max(0.0),
                })
            })
            .collect())
    }

    fn load_usage(&self) -> HealthResult<Vec<ProductUsage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, customer_id, date, daily_active_users, login_frequency,
                    feature_adoption_score, license_utilization
             FROM product_usage ORDER BY id ASC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    read_f64(row, 3)?,
                    read_f64(row, 4)?,
                    read_f64(row, 5)?,
                    read_f64(row, 6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(raw
            .into_iter()
            .filter_map(|(id, customer_id, date, dau, logins, adoption, license)| {
                skip_malformed(
                    required_date("product_usage", &id.to_string(), "date", &date).map(|date| {
                        ProductUsage {
                            customer_id,
                            date,
                            daily_active_users: dau.map(|v| v.max(0.0)),
                            login_frequency: logins.map(|v| v.max(0.0)),
                            feature_adoption_score: adoption.map(canonical_fraction),
                            license_utilization: license.map(canonical_fraction),
                        }
                    }),
                )
            })
            .collect())
    }

    fn load_feedback(&self) -> HealthResult<Vec<FeedbackRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, customer_id, nps_score, satisfaction_rating,
                    likelihood_to_renew, feedback_date
             FROM customer_feedback ORDER BY id ASC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    read_f64(row, 2)?,
                    read_f64(row, 3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(raw
            .into_iter()
            .filter_map(|(id, customer_id, nps, rating, renew, date)| {
                skip_malformed(
                    required_date("customer_feedback", &id.to_string(), "feedback_date", &date)
                        .map(|feedback_date| FeedbackRecord {
                            customer_id,
                            nps_score: nps.map(canonical_nps),
                            satisfaction_rating: rating.map(|r| r.max(0.0)),
                            likelihood_to_renew: renew.as_deref().and_then(RenewalLikelihood::parse),
                            feedback_date,
                        }),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_accept_plain_and_timestamped_forms() {
        assert_eq!(parse_date("2024-03-01"), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(parse_date("2024-03-01 10:15:00"), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(parse_date("03/01/2024"), None);
        assert!(parse_datetime("2024-03-01T10:15:00").is_some());
        assert!(parse_datetime("2024-03-01").is_some());
    }

    #[test]
    fn malformed_numbers_become_missing() {
        let store = HealthStore::in_memory().unwrap();
        store.migrate().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO customer (customer_id, company_name, monthly_recurring_revenue,
                                       contract_start_date, contract_end_date)
                 VALUES ('C1', 'Acme', 'n/a', '2023-01-01', '2025-01-01'),
                        ('C2', 'Bad Dates', 100, 'soon', '2025-01-01')",
                [],
            )
            .unwrap();
        let snap = store.load_snapshot().unwrap();
        assert_eq!(snap.customers.len(), 1);
        assert_eq!(snap.customers[0].customer_id, "C1");
        assert_eq!(snap.customers[0].monthly_recurring_revenue, 0.0);
    }

    #[test]
    fn severity_labels_are_case_insensitive_and_unknown_is_low() {
        let store = HealthStore::in_memory().unwrap();
        store.migrate().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO security_incident (incident_id, customer_id, severity, detection_time)
                 VALUES ('I1', 'C1', 'CRITICAL', '2024-06-01 08:00:00'),
                        ('I2', 'C1', 'sev-x',    '2024-06-02T08:00:00'),
                        ('I3', 'C1', 'high',     'yesterday')",
                [],
            )
            .unwrap();
        let incidents = store.load_snapshot().unwrap().incidents;
        assert_eq!(incidents.len(), 2);
        assert_eq!(incidents[0].severity, Severity::Critical);
        assert_eq!(incidents[1].severity, Severity::Low);
        assert_eq!(incidents[1].mean_time_to_detect_minutes, 0.0);
    }

    #[test]
    fn null_scores_load_as_missing_not_zero() {
        let store = HealthStore::in_memory().unwrap();
        store.migrate().unwrap();
        store
            .conn
            .execute_batch(
                "INSERT INTO product_usage (customer_id, date, daily_active_users,
                                            feature_adoption_score, license_utilization)
                 VALUES ('C1', '2024-06-01', 10, NULL, 'n/a');
                 INSERT INTO customer_feedback (customer_id, nps_score, satisfaction_rating, feedback_date)
                 VALUES ('C1', NULL, 7, '2024-06-01');",
            )
            .unwrap();
        let snap = store.load_snapshot().unwrap();
        assert_eq!(snap.usage[0].feature_adoption_score, None);
        assert_eq!(snap.usage[0].license_utilization, None);
        assert_eq!(snap.feedback[0].nps_score, None);
        assert_eq!(snap.feedback[0].satisfaction_rating, Some(7.0));
    }
}
