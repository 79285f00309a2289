use crate::models::Priority;

/// Static description of one emergency protocol.
#[derive(Debug)]
pub struct ProtocolSpec {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub location: &'static str,
    /// Seconds staff have to assemble the equipment before the session is overdue.
    pub timeout_secs: u64,
    pub equipment: &'static [EquipmentSpec],
}

#[derive(Debug)]
pub struct EquipmentSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub priority: Priority,
    pub keywords: &'static [&'static str],
    pub confidence: f32,
}

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

pub static PROTOCOLS: &[ProtocolSpec] = &[
    ProtocolSpec {
        code: "Code Blue",
        name: "Cardiac Arrest",
        description: "Patient experiencing cardiac arrest requiring immediate resuscitation",
        location: "ER/Ambulance",
        timeout_secs: 30,
        equipment: &[
            EquipmentSpec {
                name: "AED",
                description: "Automated External Defibrillator",
                priority: Priority::Critical,
                keywords: &["aed", "defibrillator", "defib"],
                confidence: 0.8,
            },
            EquipmentSpec {
                name: "Crash Cart",
                description: "Emergency medication and equipment cart",
                priority: Priority::Critical,
                keywords: &["crash cart", "emergency cart", "code cart"],
                confidence: 0.8,
            },
            EquipmentSpec {
                name: "Airway Bag",
                description: "Bag valve mask and airway management equipment",
                priority: Priority::Critical,
                keywords: &["airway bag", "bag valve", "bmv", "ventilation"],
                confidence: 0.7,
            },
            EquipmentSpec {
                name: "Oxygen Tank",
                description: "Oxygen cylinder for patient ventilation",
                priority: Priority::Critical,
                keywords: &["oxygen tank", "oxygen cylinder", "o2 tank"],
                confidence: 0.7,
            },
            EquipmentSpec {
                name: "Epinephrine",
                description: "Epinephrine auto-injector or vial",
                priority: Priority::Critical,
                keywords: &["epinephrine", "epi", "adrenaline"],
                confidence: 0.6,
            },
        ],
    },
    ProtocolSpec {
        code: "Code Red",
        name: "Fire Emergency",
        description: "Fire or smoke emergency requiring evacuation",
        location: "Hospital/Ambulance",
        timeout_secs: 60,
        equipment: &[
            EquipmentSpec {
                name: "Fire Extinguisher",
                description: "Portable fire extinguisher",
                priority: Priority::Critical,
                keywords: &["fire extinguisher", "extinguisher"],
                confidence: 0.8,
            },
            EquipmentSpec {
                name: "Emergency Exit",
                description: "Designated emergency exit route",
                priority: Priority::Critical,
                keywords: &["exit", "emergency exit", "fire exit"],
                confidence: 0.9,
            },
            EquipmentSpec {
                name: "Fire Alarm",
                description: "Fire alarm system activation",
                priority: Priority::Critical,
                keywords: &["fire alarm", "alarm"],
                confidence: 0.9,
            },
        ],
    },
    ProtocolSpec {
        code: "Code Pink",
        name: "Infant/Child Abduction",
        description: "Missing or abducted infant or child",
        location: "Hospital",
        timeout_secs: 45,
        equipment: &[
            EquipmentSpec {
                name: "Security Badge",
                description: "Staff identification and access control",
                priority: Priority::High,
                keywords: &["badge", "id card", "security badge"],
                confidence: 0.7,
            },
            EquipmentSpec {
                name: "Emergency Contact",
                description: "Emergency contact information",
                priority: Priority::High,
                keywords: &["contact", "emergency contact"],
                confidence: 0.6,
            },
            EquipmentSpec {
                name: "Safe Room",
                description: "Designated safe room location",
                priority: Priority::High,
                keywords: &["safe room", "secure room"],
                confidence: 0.8,
            },
        ],
    },
];
