//! Row projections of a template for export

use super::template::ConstructTemplate;

impl ConstructTemplate {
    /// `[name, x, y, z, 0, 0, 0]` per part, in declaration order
    pub fn cube_table(&self) -> Vec<Vec<String>> {
        self.cubes
            .iter()
            .map(|part| {
                let [x, y, z] = part.position;
                vec![
                    part.name.clone(),
                    format_g(x),
                    format_g(y),
                    format_g(z),
                    "0".to_string(),
                    "0".to_string(),
                    "0".to_string(),
                ]
            })
            .collect()
    }

    /// `[a, b, joint_type, "k:v", ...]` per consecutive chain pair
    ///
    /// Parameter cells are ordered by key.
    pub fn joint_table(&self) -> Vec<Vec<String>> {
        let params: Vec<String> = self
            .joint_params
            .iter()
            .map(|(k, v)| format!("{}:{}", k, format_g(*v)))
            .collect();

        self.chains
            .iter()
            .flat_map(|chain| chain.windows(2))
            .map(|pair| {
                let mut row = vec![pair[0].clone(), pair[1].clone(), self.joint_type.clone()];
                row.extend(params.iter().cloned());
                row
            })
            .collect()
    }
}

/// Shortest round-trip digits, switching to `d.ddde±XX` outside `1e-4..1e6`
fn format_g(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if v == 0.0 {
        return v.to_string();
    }

    let sci = format!("{:e}", v);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return v.to_string();
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    if (-4..6).contains(&exp) {
        v.to_string()
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exp.abs())
    }
}
