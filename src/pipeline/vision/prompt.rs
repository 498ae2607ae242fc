pub const PRESCRIPTION_VISION_PROMPT: &str = r#"
You are reading a photograph of a medical prescription. Extract ONLY what is
written on it.

RULES:
1. One JSON object per medicine on the prescription, in the order written.
2. Never invent a medicine, dose or schedule. If a field is unreadable or
   absent, use null.
3. Keep the dose number and its unit in separate fields.
4. duration_days is a whole number of days (convert weeks and months).
5. Output ONLY a JSON array. No prose, no Markdown fences.

Each element has exactly these fields:
{
  "medicine_name": "name as written, or null",
  "dosage": "numeric amount, e.g. \"500\", or null",
  "dosage_unit": "mg | mcg | g | ml | units | ... or null",
  "frequency": "e.g. \"Twice daily\", \"Every 8 hours\", or null",
  "duration_days": 7,
  "route": "oral | injection | topical | inhaled | ... or null"
}
"#;
