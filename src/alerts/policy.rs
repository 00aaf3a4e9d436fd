//! Alert decision for a derived index result.
//!
//! Pure: the same measurement and result always produce the same decision.

use serde::Serialize;

use crate::models::{AlertSeverity, IndexResult, Measurement, Pollutant, StatusBand};

// ---

/// Aggregate index above which a sensor is put into alert.
pub const ALERT_THRESHOLD: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertDecision {
    // ---
    pub should_alert: bool,
    /// Computed even when not alerting; check `should_alert` first.
    pub severity: AlertSeverity,
    pub messages: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Concentration above which a pollutant is called out in the alert message.
pub fn safe_threshold(pollutant: Pollutant) -> f64 {
    match pollutant {
        Pollutant::Pm25 => 55.4,
        Pollutant::Pm10 => 154.0,
        Pollutant::Co => 9.4,
        Pollutant::No2 => 100.0,
        Pollutant::So2 => 75.0,
        Pollutant::O3 => 70.0,
    }
}

fn mitigation(pollutant: Pollutant) -> &'static str {
    match pollutant {
        Pollutant::Pm25 => "Wear N95 masks and use air purifiers.",
        Pollutant::Pm10 => "Avoid outdoor activities.",
        Pollutant::Co => "Ensure proper ventilation and check for gas leaks.",
        Pollutant::No2 => "Reduce vehicle usage and stay indoors.",
        Pollutant::So2 => "Avoid industrial areas and seek medical help if needed.",
        Pollutant::O3 => "Limit outdoor activities during peak hours.",
    }
}

pub fn severity_for(aggregate_index: f64) -> AlertSeverity {
    // ---
    if aggregate_index <= 100.0 {
        AlertSeverity::Info
    } else if aggregate_index <= 200.0 {
        AlertSeverity::Warning
    } else if aggregate_index <= 300.0 {
        AlertSeverity::Critical
    } else {
        AlertSeverity::Emergency
    }
}

/// Health recommendations for a status band.
pub fn recommendations_for(band: StatusBand) -> &'static [&'static str] {
    // ---
    match band {
        StatusBand::Good => &["Air quality is satisfactory for outdoor activities."],
        StatusBand::Moderate => {
            &["Unusually sensitive people should consider limiting prolonged outdoor exertion."]
        }
        StatusBand::UnhealthySg => &[
            "Children, elderly, and people with heart/lung disease should limit outdoor activities.",
            "Consider wearing masks when outdoors.",
            "Use air purifiers indoors.",
        ],
        StatusBand::Unhealthy => &[
            "Everyone should limit outdoor activities.",
            "Wear N95 masks when going outside.",
            "Keep windows closed and use air purifiers.",
            "People with heart/lung disease should stay indoors.",
        ],
        StatusBand::VeryUnhealthy => &[
            "Everyone should avoid outdoor activities.",
            "Stay indoors with air purifiers running.",
            "Seek medical attention if experiencing symptoms.",
            "Schools should cancel outdoor activities.",
        ],
        StatusBand::Hazardous => &[
            "Emergency conditions - everyone should stay indoors.",
            "Seek immediate medical attention if experiencing symptoms.",
            "Consider evacuating the area if possible.",
            "All outdoor activities should be cancelled.",
        ],
    }
}

fn pollutant_message(pollutant: Pollutant, concentration: f64) -> String {
    // ---
    let unit = pollutant.unit();
    format!(
        "{} level is {:.2} {} (Safe: 0-{} {}). {}",
        pollutant.display_name(),
        concentration,
        unit,
        safe_threshold(pollutant),
        unit,
        mitigation(pollutant)
    )
}

/// Decide whether `result` warrants an alert and describe it.
pub fn evaluate(measurement: &Measurement, result: &IndexResult) -> AlertDecision {
    // ---
    let aggregate = result.aggregate_index;
    let mut messages = Vec::new();
    let mut recommendations = Vec::new();

    if aggregate <= 50.0 {
        messages.push("Air quality is Good. No precautions needed.".to_string());
        recommendations.push("Enjoy outdoor activities!".to_string());
    } else if aggregate <= ALERT_THRESHOLD {
        messages.push(
            "Air quality is Moderate. Sensitive individuals should consider limiting \
             prolonged outdoor exertion."
                .to_string(),
        );
        recommendations.push("Sensitive individuals should limit outdoor activities.".to_string());
    } else {
        let exceeded: Vec<String> = Pollutant::ALL
            .into_iter()
            .filter_map(|p| {
                let c = measurement.concentrations.get(p);
                (c > safe_threshold(p)).then(|| pollutant_message(p, c))
            })
            .collect();

        if !exceeded.is_empty() {
            messages.push(format!(
                "Air quality is {}. Pollutants detected: {}",
                result.status_band.title(),
                exceeded.join(" ")
            ));
        }

        recommendations.extend(
            recommendations_for(result.status_band)
                .iter()
                .map(|r| r.to_string()),
        );
    }

    AlertDecision {
        should_alert: aggregate > ALERT_THRESHOLD,
        severity: severity_for(aggregate),
        messages,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::aqi::derive;
    use crate::models::Concentrations;
    use chrono::Utc;
    use uuid::Uuid;

    fn decide(c: Concentrations) -> (IndexResult, AlertDecision) {
        // ---
        let m = Measurement {
            id: Uuid::new_v4(),
            sensor_id: "S1".to_string(),
            timestamp: Utc::now(),
            concentrations: c,
        };
        let r = derive(&m);
        let d = evaluate(&m, &r);
        (r, d)
    }

    #[test]
    fn test_severity_mapping() {
        // ---
        assert_eq!(severity_for(0.0), AlertSeverity::Info);
        assert_eq!(severity_for(100.0), AlertSeverity::Info);
        assert_eq!(severity_for(101.0), AlertSeverity::Warning);
        assert_eq!(severity_for(200.0), AlertSeverity::Warning);
        assert_eq!(severity_for(201.0), AlertSeverity::Critical);
        assert_eq!(severity_for(300.0), AlertSeverity::Critical);
        assert_eq!(severity_for(300.1), AlertSeverity::Emergency);
        assert_eq!(severity_for(500.0), AlertSeverity::Emergency);
    }

    #[test]
    fn test_good_air_no_alert() {
        // ---
        let (_, d) = decide(Concentrations {
            pm25: 10.0,
            ..Default::default()
        });

        assert!(!d.should_alert);
        assert_eq!(d.severity, AlertSeverity::Info);
        assert_eq!(d.messages, vec!["Air quality is Good. No precautions needed."]);
        assert_eq!(d.recommendations, vec!["Enjoy outdoor activities!"]);
    }

    #[test]
    fn test_moderate_air_no_alert() {
        // ---
        let (r, d) = decide(Concentrations {
            pm25: 30.0,
            ..Default::default()
        });

        assert_eq!(r.status_band, StatusBand::Moderate);
        assert!(!d.should_alert);
        assert!(d.messages[0].starts_with("Air quality is Moderate."));
    }

    #[test]
    fn test_unhealthy_pm25_alert() {
        // ---
        let (_, d) = decide(Concentrations {
            pm25: 150.4,
            ..Default::default()
        });

        assert!(d.should_alert);
        assert_eq!(d.severity, AlertSeverity::Warning);
        assert_eq!(d.messages.len(), 1);
        assert_eq!(
            d.messages[0],
            "Air quality is Unhealthy. Pollutants detected: PM2.5 level is 150.40 µg/m³ \
             (Safe: 0-55.4 µg/m³). Wear N95 masks and use air purifiers."
        );
        assert_eq!(d.recommendations, recommendations_for(StatusBand::Unhealthy));
    }

    #[test]
    fn test_sensitive_groups_band_uses_full_title() {
        // ---
        let (r, d) = decide(Concentrations {
            pm25: 40.0,
            co: 10.0,
            ..Default::default()
        });

        assert_eq!(r.status_band, StatusBand::UnhealthySg);
        assert!(d.should_alert);
        assert!(d.messages[0]
            .starts_with("Air quality is Unhealthy for Sensitive Groups. Pollutants detected: CO"));
    }

    #[test]
    fn test_multiple_pollutants_in_canonical_order() {
        // ---
        let (_, d) = decide(Concentrations {
            pm25: 60.0,
            co: 10.0,
            o3: 90.0,
            ..Default::default()
        });

        assert!(d.should_alert);
        let msg = &d.messages[0];
        let pm = msg.find("PM2.5 level").unwrap();
        let co = msg.find("CO level").unwrap();
        let o3 = msg.find("O3 level").unwrap();
        assert!(pm < co && co < o3);
        assert!(msg.contains("(Safe: 0-9.4 ppm)"));
        assert!(msg.contains("(Safe: 0-70 ppb)"));
    }

    #[test]
    fn test_alert_without_thresholded_pollutant() {
        // ---
        // PM2.5 at 40 is index 112 but below its 55.4 safe threshold
        let (r, d) = decide(Concentrations {
            pm25: 40.0,
            co: 10.0,
            ..Default::default()
        });

        assert_eq!(r.status_band, StatusBand::UnhealthySg);
        assert!(d.should_alert);
        assert!(d.messages.is_empty());
        assert_eq!(d.recommendations.len(), 3);
    }

    #[test]
    fn test_hazardous_is_emergency() {
        // ---
        let (r, d) = decide(Concentrations {
            pm25: 400.0,
            ..Default::default()
        });

        assert_eq!(r.status_band, StatusBand::Hazardous);
        assert_eq!(d.severity, AlertSeverity::Emergency);
        assert!(d.should_alert);
    }
}
