//! Fixed sample rows written into empty collections on first start.

use crate::models::{Announcement, Coordinator, Event};

pub fn events() -> Vec<Event> {
    vec![
        Event {
            id: String::new(),
            title: "Hackathon".to_string(),
            description: "A 24-hour coding marathon to build innovative solutions using AI and ML."
                .to_string(),
            date: "2024-07-15".to_string(),
            time: "10:00 AM".to_string(),
            venue: "Main Auditorium".to_string(),
            category: "Coding".to_string(),
            image: Some("https://placehold.co/400x250/3b82f6/ffffff?text=Hackathon".to_string()),
            team_size: "1-4".to_string(),
            price: 150,
            max_participants: 100,
            registered_count: 42,
            google_form_url: Some(
                "https://docs.google.com/forms/d/e/1FAIpQLSfexample1/viewform".to_string(),
            ),
            created_by: None,
        },
        Event {
            id: String::new(),
            title: "AI Workshop".to_string(),
            description: "Hands-on session on building neural networks and deep learning models."
                .to_string(),
            date: "2024-07-18".to_string(),
            time: "2:00 PM".to_string(),
            venue: "AI Lab, Block C".to_string(),
            category: "Workshop".to_string(),
            image: Some("https://placehold.co/400x250/10b981/ffffff?text=AI+Workshop".to_string()),
            team_size: "1".to_string(),
            price: 200,
            max_participants: 50,
            registered_count: 28,
            google_form_url: Some(
                "https://docs.google.com/forms/d/e/1FAIpQLSfexample2/viewform".to_string(),
            ),
            created_by: None,
        },
        Event {
            id: String::new(),
            title: "Tech Quiz".to_string(),
            description: "Test your knowledge in computer science, algorithms, and tech history."
                .to_string(),
            date: "2024-07-20".to_string(),
            time: "11:00 AM".to_string(),
            venue: "Seminar Hall".to_string(),
            category: "Competition".to_string(),
            image: Some("https://placehold.co/400x250/f59e0b/ffffff?text=Tech+Quiz".to_string()),
            team_size: "1-2".to_string(),
            price: 100,
            max_participants: 80,
            registered_count: 67,
            google_form_url: Some(
                "https://docs.google.com/forms/d/e/1FAIpQLSfexample3/viewform".to_string(),
            ),
            created_by: None,
        },
    ]
}

pub fn coordinators() -> Vec<Coordinator> {
    vec![
        Coordinator {
            id: String::new(),
            name: "Dr. Anjali Sharma".to_string(),
            department: "AI & ML".to_string(),
            role: "Event Head".to_string(),
            phone: "+91 9876543210".to_string(),
            email: "anjali.sharma@college.edu".to_string(),
            photo: Some("https://placehold.co/150x150/d946ef/ffffff?text=AS".to_string()),
        },
        Coordinator {
            id: String::new(),
            name: "Rahul Verma".to_string(),
            department: "Computer Science".to_string(),
            role: "Technical Coordinator".to_string(),
            phone: "+91 8765432109".to_string(),
            email: "rahul.verma@college.edu".to_string(),
            photo: Some("https://placehold.co/150x150/06b6d4/ffffff?text=RV".to_string()),
        },
    ]
}

pub fn announcements() -> Vec<Announcement> {
    vec![Announcement {
        id: String::new(),
        message: "Venue for AI Workshop changed to AI Lab, Block C.".to_string(),
        urgent: false,
        date: "2024-06-08".to_string(),
    }]
}
