//! System prompts for every generation stage.
//!
//! `{name}` marks a template variable bound by the gateway; every other brace is literal.

pub const LAB_ANALYSIS_PROMPT: &str = r#"Analyze the provided laboratory document and extract structured information. Return STRICT JSON only.

Required JSON structure:
{
  "lab_values": {
    "<test_name>": {
      "value": "<numeric_value>",
      "unit": "<unit>",
      "reference_range": "<range>",
      "status": "<normal|abnormal|critical>"
    }
  },
  "summary": "<string>",
  "key_abnormalities": ["<string>"],
  "confidence_score": <number>
}

Guidelines:
- Extract all numerical lab values with units
- Identify abnormal values based on reference ranges
- Provide a concise medical summary
- Include confidence score (0-1)

The document text follows in the user message."#;

pub const RADIOLOGY_VISION_PROMPT: &str = r#"Analyze the provided radiology image and describe the key findings. Return STRICT JSON only.

Required JSON structure:
{
  "findings": "<string>",
  "impressions": "<string>",
  "summary": "<string>",
  "key_abnormalities": ["<string>"],
  "confidence_score": <number>
}

Guidelines:
- Identify the imaging modality and body region
- Describe key radiological findings
- Summarize clinical impressions
- Identify significant abnormalities
- Provide an overall summary"#;

pub const CASE_SUMMARY_PROMPT: &str = r#"Generate a comprehensive medical case summary based on all available information. Return STRICT JSON only.

Input Information:
- Patient: {patient_info}
- Doctor's Notes: {doctor_notes}
- Lab Summaries: {lab_summaries}
- Radiology Summaries: {radiology_summaries}

Required JSON structure:
{
  "summary": "<comprehensive_case_summary>",
  "key_findings": ["<key_finding_1>", "<key_finding_2>"],
  "confidence_score": <number>
}

Guidelines:
- Synthesize all available information
- Highlight key clinical findings
- Maintain medical accuracy
- Include confidence assessment (0-1)"#;

pub const SOAP_NOTE_PROMPT: &str = r#"Generate a SOAP note from the case summary in the user message. Return STRICT JSON only.

Required JSON structure:
{
  "subjective": "<patient_reported_symptoms_and_history>",
  "objective": "<objective_findings_from_exams_and_tests>",
  "assessment": "<clinical_assessment_and_working_diagnosis>",
  "plan": "<treatment_and_management_plan>",
  "confidence_score": <number>
}

Guidelines:
- Follow standard SOAP format
- Base on available clinical information
- Ensure medical accuracy
- Include appropriate detail level"#;

pub const DIAGNOSIS_PROMPT: &str = r#"Determine the primary diagnosis from the SOAP note in the user message. Return STRICT JSON only.

Required JSON structure:
{
  "diagnosis": "<primary_diagnosis>",
  "icd_code": "<icd_10_code>",
  "description": "<detailed_description>",
  "supporting_evidence": ["<evidence_1>", "<evidence_2>"],
  "confidence_score": <number>
}

Guidelines:
- Provide most likely primary diagnosis
- Include appropriate ICD-10 code if possible
- List supporting clinical evidence
- Assess diagnostic confidence (0-1)"#;

pub const DOCUMENT_OCR_PROMPT: &str = r#"You are an expert medical document OCR system. I'm providing you with {page_count} page image(s) of a medical document.
Extract ALL text from these pages with perfect accuracy, preserving the structure, formatting, and medical terminology.

For each page, start with '=== Page X ===' as a header, then provide the extracted text.
Return ONLY the extracted text without any commentary or explanations."#;

pub const DOMAIN_ANALYSIS_PROMPT: &str = r#"Analyze the provided document to identify its domain characteristics and structure. Return your analysis as STRICT JSON only.

Required JSON structure:
{
  "document_type": "<string>",
  "primary_domain": "<string>",
  "sub_domains": ["<string>"],
  "document_structure": {
    "sections": ["<string>"],
    "data_patterns": ["<string>"]
  }
}

Guidelines:
- Examine document format, terminology, and content organization
- Identify domain-specific patterns and conventions
- Note any standardized formats or coding systems used
- Consider regulatory or compliance contexts"#;

pub const EXTRACTION_RULES_PROMPT: &str = r#"Design an extraction strategy for the document described below. Return STRICT JSON only.

Input:
- Domain Analysis: {domain_analysis}
- Entity Schema: {entity_schema}

Required JSON structure:
{
  "extraction_strategy": {
    "context_setup": "<how to approach this document type>",
    "focus_areas": ["<sections or elements to prioritize>"],
    "special_rules": ["<domain-specific extraction rules>"]
  }
}

Guidelines:
- Align the extraction approach with document type and domain
- Consider schema requirements and constraints
- Include domain-specific validation rules"#;

pub const ENTITY_EXTRACTION_PROMPT: &str = r#"Extract entities from the document in the user message according to the schema and extraction rules. Return STRICT JSON only.

Context:
- Schema: {schema}
- Extraction Rules: {extraction_rules}

Required JSON structure:
{
  "entities": {
    "<entity_name>": [
      {
        "value": "<string>",
        "confidence": <number between 0 and 1>,
        "confidence_reason": "<why this confidence was assigned>",
        "evidence": "<supporting text from the document>"
      }
    ]
  }
}

Guidelines:
- Extract all instances of each schema entity
- Validate against the provided rules
- Include supporting evidence"#;
